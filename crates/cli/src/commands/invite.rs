//! Invitation code generation.
//!
//! # Usage
//!
//! ```bash
//! kado-cli invite generate --count 25
//! ```

use kado_web::services::invitations;

/// Most codes one run may generate.
pub const MAX_COUNT: usize = 1000;

/// Generate `count` codes and print them one per line.
///
/// # Errors
///
/// Returns an error if `count` is out of range or the insert fails.
pub async fn generate(count: usize) -> Result<(), Box<dyn std::error::Error>> {
    if !(1..=MAX_COUNT).contains(&count) {
        return Err(format!("count must be between 1 and {MAX_COUNT}").into());
    }

    let pool = super::connect().await?;
    let records = invitations::create_codes(&pool, count, None).await?;

    if records.len() < count {
        tracing::warn!(
            requested = count,
            created = records.len(),
            "Some generated codes collided with existing ones"
        );
    }

    #[allow(clippy::print_stdout)]
    for record in &records {
        println!("{}", record.code);
    }
    Ok(())
}
