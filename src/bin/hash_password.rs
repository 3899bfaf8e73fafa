//! Prints an argon2id hash for seeding an administrator account.
//!
//! Usage: `hash_password <password>` or pipe the password on stdin.

use std::io::BufRead;

use taxpayer_registry_api::auth::{hash_password, validate_new_password};

fn main() -> anyhow::Result<()> {
    let password = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    validate_new_password(&password)?;
    let hash = hash_password(&password)?;
    println!("{}", hash);
    Ok(())
}
