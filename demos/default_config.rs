//! Prints the default configuration as TOML
//!
//! `cargo run --example default_config > tnc.toml` gives a starting point
//! for `freedv-tnc tnc.toml`.

use freedv_tnc::Config;

fn main() -> freedv_tnc::Result<()> {
    let config = Config::default();
    config.validate()?;
    print!("{}", config.to_toml()?);
    Ok(())
}
