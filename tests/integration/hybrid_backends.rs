//! Hybrid backend selection: each entity type persists through the backend
//! its repository was configured with, and the health check reports every
//! distinct backend in use.

use crate::integration::test_utils::{engine_with_policy, outcome, template, OWNER};
use stride::config::BackendPolicy;
use stride::entity::ProgramStatus;
use stride::types::{BackendId, Mode};

fn inverted_policy() -> BackendPolicy {
    // Opposite of the default split.
    BackendPolicy {
        template: BackendId::Relational,
        scenario: BackendId::Object,
        program: BackendId::Object,
        task: BackendId::Relational,
        evaluation: BackendId::Relational,
    }
}

#[tokio::test]
async fn full_walk_on_an_inverted_policy() -> anyhow::Result<()> {
    let fixture = engine_with_policy(
        vec![template("tpl", Mode::Pbl, &[&["A"], &["A"]])],
        vec![
            Ok(outcome(&[("A", 70.0)], 70.0, 100.0)),
            Ok(outcome(&[("A", 90.0)], 90.0, 100.0)),
        ],
        inverted_policy(),
    );
    let svc = &fixture.service;

    assert_eq!(fixture.repos.scenarios().backend_id(), BackendId::Object);
    assert_eq!(fixture.repos.tasks().backend_id(), BackendId::Relational);
    assert_eq!(
        fixture.repos.evaluations().backend_id(),
        BackendId::Relational
    );

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let mut state = svc.activate_program(OWNER, &program.id).await?;
    while let Some(task) = state.task.take() {
        svc.complete_task(OWNER, &task.id).await?;
        state = svc.program_state(OWNER, &program.id)?;
    }

    assert_eq!(state.program.status, ProgramStatus::Completed);
    let aggregate = svc.program_evaluation(&program.id)?.unwrap();
    assert_eq!(aggregate.domain_scores["A"], 80.0);
    Ok(())
}

#[tokio::test]
async fn health_check_reports_each_distinct_backend() {
    let fixture = engine_with_policy(vec![], vec![], BackendPolicy::default());
    let report = fixture.repos.health_check();
    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|h| h.reachable), "{report:?}");

    let single = BackendPolicy {
        template: BackendId::Object,
        scenario: BackendId::Object,
        program: BackendId::Object,
        task: BackendId::Object,
        evaluation: BackendId::Object,
    };
    let fixture = engine_with_policy(vec![], vec![], single);
    let report = fixture.repos.health_check();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].backend, BackendId::Object);
    assert!(report[0].reachable);
}

#[tokio::test]
async fn entities_land_in_their_configured_backend() -> anyhow::Result<()> {
    // Everything relational except tasks: a scenario written through the
    // service must be invisible to a freshly opened object store and present
    // in the relational file.
    let policy = BackendPolicy {
        template: BackendId::Relational,
        scenario: BackendId::Relational,
        program: BackendId::Relational,
        task: BackendId::Object,
        evaluation: BackendId::Relational,
    };
    let fixture = engine_with_policy(
        vec![template("tpl", Mode::Discovery, &[&["A"]])],
        vec![],
        policy,
    );
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let state = svc.activate_program(OWNER, &program.id).await?;
    let task = state.task.unwrap();

    // Round-trips go through the configured backend transparently.
    assert_eq!(svc.scenario_state(OWNER, &scenario.id)?.id, scenario.id);
    let tasks = svc.program_tasks(OWNER, &program.id)?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert_eq!(fixture.repos.tasks().backend_id(), BackendId::Object);
    assert_eq!(fixture.repos.scenarios().backend_id(), BackendId::Relational);
    Ok(())
}
