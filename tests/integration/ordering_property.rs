//! Property-based test: interaction submission order survives storage.

use crate::integration::test_utils::{engine, template, OWNER};
use proptest::prelude::*;
use serde_json::json;
use stride::entity::Actor;
use stride::types::Mode;

/// Appending any sequence of payloads yields exactly that sequence back.
#[test]
fn interaction_order_is_preserved_property() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
        cases: 16,
        ..Default::default()
    });

    runner
        .run(
            &proptest::collection::vec("[a-z0-9]{1,12}", 1..24),
            |payloads| {
                let fixture = engine(vec![template("tpl", Mode::Discovery, &[&["A"]])], vec![]);
                let svc = fixture.service.clone();

                let (program_id, task_id) = runtime.block_on(async {
                    let scenario = svc.start_scenario(OWNER, "tpl").await.unwrap();
                    let program = svc
                        .start_program(OWNER, &scenario.id, Default::default())
                        .await
                        .unwrap();
                    let state = svc.activate_program(OWNER, &program.id).await.unwrap();
                    (program.id, state.task.unwrap().id)
                });

                for payload in &payloads {
                    svc.append_interaction(OWNER, &task_id, Actor::Learner, json!({ "text": payload }))
                        .unwrap();
                }

                let task = svc
                    .program_state(OWNER, &program_id)
                    .unwrap()
                    .task
                    .unwrap();
                let stored: Vec<String> = task
                    .interactions
                    .iter()
                    .map(|i| i.content["text"].as_str().unwrap().to_string())
                    .collect();
                prop_assert_eq!(stored, payloads);
                Ok(())
            },
        )
        .unwrap();
}
