use std::sync::Arc;

use chrono::Duration;
use chrono::Utc;
use rotonda::derive_states;
use rotonda::JwksAssembler;
use rotonda::KeyRecordStore;
use rotonda::KeyService;
use rotonda::LocalSigningBackend;
use rotonda::MemoryKeyRecordStore;
use rotonda::RotationController;
use rotonda::RotondaConfig;
use rotonda::SigningKeySelector;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Reads ROTONDA_* variables, falling back to namespace "test" and a 90 day period
    let config = RotondaConfig::from_env()?;
    let namespace = config.namespace().to_string();

    let store = Arc::new(MemoryKeyRecordStore::new());
    let backend = Arc::new(LocalSigningBackend::new());

    // Example 1: Entry points as a scheduler and relying parties see them
    println!("=== Example 1: Entry Points ===");
    let service = KeyService::new(config.clone(), store.clone(), backend.clone());

    let response = service.generate_key().await;
    println!("POST generate-key -> {} {}", response.status, response.body);

    let response = service.jwks().await;
    println!("GET jwks.json -> {}", response.status);
    println!("{}", response.body);

    println!();

    // Example 2: A full rotation cycle with simulated time
    println!("=== Example 2: Rotation Cycle ===");
    let rotation = RotationController::from_config(&config, store.clone(), backend.clone());
    let selector = SigningKeySelector::new(store.clone());
    let assembler = JwksAssembler::new(store.clone(), backend.clone());

    let period = Duration::days(i64::from(config.rotation_period_days()));
    let start = Utc::now();
    for now in [start, start + period + Duration::days(2)] {
        let outcome = rotation.rotate_at(&namespace, now).await?;
        println!(
            "✓ Rotated to {} (expires {}), reaped {:?}",
            outcome.alias, outcome.expiration_date, outcome.reaped
        );

        let signing = selector.select_signing_key_at(&namespace, now).await?;
        let jwks = assembler.assemble_at(&namespace, now).await?;
        let published: Vec<_> = jwks
            .keys
            .iter()
            .filter_map(|jwk| jwk.common.key_id.as_deref())
            .collect();
        println!("  Signing with: {}", signing.kid);
        println!("  Published:    {published:?}");

        let records = store.query(&namespace, None).await?;
        for (version, state) in derive_states(&records, now) {
            println!("  v{version}: {state:?}");
        }
    }

    Ok(())
}
