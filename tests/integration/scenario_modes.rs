//! Mode-dependent scenario semantics: PBL singleton progress vs. Discovery
//! and Assessment re-attempts, and the one-active-program invariant.

use crate::integration::test_utils::{engine, outcome, template, OWNER};
use stride::entity::ProgramStatus;
use stride::error::EngineError;
use stride::types::Mode;

#[tokio::test]
async fn pbl_start_is_a_singleton_per_owner_and_template() -> anyhow::Result<()> {
    let fixture = engine(vec![template("tpl", Mode::Pbl, &[&["A"]])], vec![]);
    let svc = &fixture.service;

    let first = svc.start_scenario(OWNER, "tpl").await?;
    let second = svc.start_scenario(OWNER, "tpl").await?;
    assert_eq!(first.id, second.id);

    // A different owner gets their own scenario.
    let other = svc.start_scenario("learner-2", "tpl").await?;
    assert_ne!(first.id, other.id);
    Ok(())
}

#[tokio::test]
async fn discovery_and_assessment_allow_reattempts() -> anyhow::Result<()> {
    let fixture = engine(
        vec![
            template("disc", Mode::Discovery, &[&["A"]]),
            template("quiz", Mode::Assessment, &[&["A"]]),
        ],
        vec![],
    );
    let svc = &fixture.service;

    let d1 = svc.start_scenario(OWNER, "disc").await?;
    let d2 = svc.start_scenario(OWNER, "disc").await?;
    assert_ne!(d1.id, d2.id);

    let q1 = svc.start_scenario(OWNER, "quiz").await?;
    let q2 = svc.start_scenario(OWNER, "quiz").await?;
    assert_ne!(q1.id, q2.id);
    Ok(())
}

#[tokio::test]
async fn second_active_program_is_rejected() -> anyhow::Result<()> {
    let fixture = engine(vec![template("tpl", Mode::Discovery, &[&["A"]])], vec![]);
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let first = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let second = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    assert_eq!(second.ordinal, first.ordinal + 1);

    svc.activate_program(OWNER, &first.id).await?;
    let err = svc.activate_program(OWNER, &second.id).await.unwrap_err();
    match err {
        EngineError::AlreadyActive { active, .. } => assert_eq!(active, first.id),
        other => panic!("expected AlreadyActive, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn completing_a_program_frees_the_scenario_for_the_next_attempt() -> anyhow::Result<()> {
    let fixture = engine(
        vec![template("tpl", Mode::Assessment, &[&["A"]])],
        vec![
            Ok(outcome(&[("A", 40.0)], 40.0, 100.0)),
            Ok(outcome(&[("A", 95.0)], 95.0, 100.0)),
        ],
    );
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;

    let first = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let task = svc
        .activate_program(OWNER, &first.id)
        .await?
        .task
        .unwrap();
    svc.complete_task(OWNER, &task.id).await?;

    // The slot is free again: the retake activates cleanly.
    let retake = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    assert_eq!(retake.ordinal, 1);
    let task = svc
        .activate_program(OWNER, &retake.id)
        .await?
        .task
        .unwrap();
    let completion = svc.complete_task(OWNER, &task.id).await?;
    assert_eq!(completion.program.status, ProgramStatus::Completed);

    // Each attempt keeps its own aggregate.
    let first_aggregate = svc.program_evaluation(&first.id)?.unwrap();
    let retake_aggregate = svc.program_evaluation(&retake.id)?.unwrap();
    assert_eq!(first_aggregate.domain_scores["A"], 40.0);
    assert_eq!(retake_aggregate.domain_scores["A"], 95.0);
    Ok(())
}

#[tokio::test]
async fn abandoning_a_program_frees_the_slot_without_scoring() -> anyhow::Result<()> {
    let fixture = engine(vec![template("tpl", Mode::Discovery, &[&["A"]])], vec![]);
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    svc.activate_program(OWNER, &program.id).await?;

    let abandoned = svc.abandon_program(OWNER, &program.id)?;
    assert_eq!(abandoned.status, ProgramStatus::Skipped);
    assert!(svc.program_evaluation(&program.id)?.is_none());

    let scenario = svc.scenario_state(OWNER, &scenario.id)?;
    assert!(scenario.active_program.is_none());

    // The next attempt activates without conflict.
    let next = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    svc.activate_program(OWNER, &next.id).await?;
    Ok(())
}
