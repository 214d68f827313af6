#![allow(dead_code)]

use equb::application::engine::EqubEngine;
use equb::config::EngineConfig;
use equb::domain::group::{Frequency, Group, NewGroup};
use equb::domain::identity::UserRef;
use equb::domain::money::Amount;
use equb::infrastructure::gateway::SimulatedGateway;
use equb::infrastructure::in_memory::InMemoryRepository;
use equb::infrastructure::notifier::LogNotifier;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

/// Engine over a fresh in-memory repository and an instant, always-accepting gateway.
pub fn engine() -> (EqubEngine, InMemoryRepository) {
    engine_with_config(EngineConfig::default())
}

pub fn engine_with_config(config: EngineConfig) -> (EqubEngine, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    let engine = EqubEngine::new(
        Box::new(repo.clone()),
        Box::new(SimulatedGateway::always_accepting()),
        Arc::new(LogNotifier),
        config,
    );
    (engine, repo)
}

pub fn member(i: usize) -> UserRef {
    UserRef::from_email(email(i))
}

/// Creates a group owned by `member(1)` and joins `member(2..=size)`.
pub async fn group_of(engine: &EqubEngine, amount: Decimal, size: usize) -> Group {
    let group = engine
        .create_group(
            NewGroup {
                name: format!("Group of {size}"),
                description: None,
                contribution_amount: Amount::new(amount).unwrap(),
                frequency: Frequency::Monthly,
            },
            &member(1),
        )
        .await
        .unwrap();
    for i in 2..=size {
        engine.join_group(group.id, &member(i)).await.unwrap();
    }
    group
}

/// Writes a command file that creates a group of `members`, starts it and runs
/// `rounds` fully paid rollovers.
pub fn generate_rotation_csv(path: &Path, members: usize, rounds: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["op", "group", "user", "amount", "frequency"])?;
    wtr.write_record(["create", "Rotation", &email(1), "100", "monthly"])?;
    for i in 2..=members {
        wtr.write_record(["join", "Rotation", &email(i), "", ""])?;
    }
    wtr.write_record(["start", "Rotation", &email(1), "", ""])?;

    for _ in 0..rounds {
        for i in 1..=members {
            wtr.write_record(["pay", "Rotation", &email(i), "", ""])?;
        }
        wtr.write_record(["rollover", "Rotation", &email(1), "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn email(i: usize) -> String {
    format!("member{i}@equb.test")
}
