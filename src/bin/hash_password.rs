use std::env;

use anyhow::Context;

use hrm_backend::auth::password::hash_password;

fn main() -> anyhow::Result<()> {
    let password = env::args()
        .nth(1)
        .context("Usage: hash_password <password>")?;
    let hash = hash_password(&password)?;
    println!("{hash}");
    Ok(())
}
