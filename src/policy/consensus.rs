//! Consensus and gap math for competency ratings. Values are computed on
//! read and never stored.

use serde::Serialize;
use thiserror::Error;

pub const MIN_SELF_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatingError {
    #[error("self rating must be between 1 and 5, got {0}")]
    SelfOutOfRange(i16),
    #[error("assessor rating must be between 0 and 5, got {0}")]
    AssessorOutOfRange(i16),
}

pub fn validate_self_rating(value: i16) -> Result<i16, RatingError> {
    if (MIN_SELF_RATING..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(RatingError::SelfOutOfRange(value))
    }
}

pub fn validate_assessor_rating(value: i16) -> Result<i16, RatingError> {
    if (0..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(RatingError::AssessorOutOfRange(value))
    }
}

/// Mean of self and assessor rating; the self rating alone until an assessor
/// has rated (`assessor_rating <= 0`).
pub fn consensus(self_rating: f64, assessor_rating: f64) -> f64 {
    if assessor_rating > 0.0 {
        (self_rating + assessor_rating) / 2.0
    } else {
        self_rating
    }
}

pub fn gap(required_level: f64, consensus_rating: f64) -> f64 {
    required_level - consensus_rating
}

pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingPair {
    pub self_rating: i16,
    pub assessor_rating: Option<i16>,
}

impl RatingPair {
    pub fn assessor(&self) -> Option<f64> {
        self.assessor_rating
            .filter(|value| *value > 0)
            .map(f64::from)
    }

    pub fn consensus(&self) -> f64 {
        consensus(
            f64::from(self.self_rating),
            self.assessor().unwrap_or(0.0),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverallRatings {
    pub self_average: Option<f64>,
    pub assessor_average: Option<f64>,
    pub consensus: Option<f64>,
}

pub fn overall<'a, I>(pairs: I) -> OverallRatings
where
    I: IntoIterator<Item = &'a RatingPair>,
{
    let pairs: Vec<&RatingPair> = pairs.into_iter().collect();
    let self_average = mean(pairs.iter().map(|pair| f64::from(pair.self_rating)));
    let assessor_average = mean(pairs.iter().filter_map(|pair| pair.assessor()));
    let overall_consensus =
        self_average.map(|self_avg| consensus(self_avg, assessor_average.unwrap_or(0.0)));

    OverallRatings {
        self_average,
        assessor_average,
        consensus: overall_consensus,
    }
}
