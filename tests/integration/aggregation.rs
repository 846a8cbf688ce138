//! Program-level aggregation: domain means over declaring tasks, weighted
//! overall scores, and total replacement of the aggregate record.

use crate::integration::test_utils::{engine, outcome, template, OWNER};
use stride::entity::{EvaluationSubject, ProgramStatus};
use stride::types::Mode;

#[tokio::test]
async fn two_task_aggregate_means_per_domain() -> anyhow::Result<()> {
    // Task 1 declares {A}, task 2 declares {A, B}; domain A averages over
    // both tasks, domain B only over the second.
    let fixture = engine(
        vec![template("tpl", Mode::Pbl, &[&["A"], &["A", "B"]])],
        vec![
            Ok(outcome(&[("A", 80.0)], 80.0, 100.0)),
            Ok(outcome(&[("A", 60.0), ("B", 90.0)], 75.0, 100.0)),
        ],
    );
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let mut state = svc.activate_program(OWNER, &program.id).await?;
    while let Some(task) = state.task.take() {
        svc.complete_task(OWNER, &task.id).await?;
        state = svc.program_state(OWNER, &program.id)?;
    }

    assert_eq!(state.program.status, ProgramStatus::Completed);

    let aggregate = svc.program_evaluation(&program.id)?.expect("aggregate exists");
    assert_eq!(aggregate.subject, EvaluationSubject::Program(program.id.clone()));
    assert_eq!(aggregate.domain_scores.len(), 2);
    assert_eq!(aggregate.domain_scores["A"], 70.0);
    assert_eq!(aggregate.domain_scores["B"], 90.0);
    // Overall: sum of scores over sum of max scores.
    assert_eq!(aggregate.score, 155.0);
    assert_eq!(aggregate.max_score, 200.0);
    Ok(())
}

#[tokio::test]
async fn stored_evaluations_round_trip_their_domain_maps() -> anyhow::Result<()> {
    let fixture = engine(
        vec![template("tpl", Mode::Discovery, &[&["A", "B", "C"]])],
        vec![Ok(outcome(
            &[("A", 0.0), ("B", 55.5), ("C", 100.0)],
            62.0,
            100.0,
        ))],
    );
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let task = svc
        .activate_program(OWNER, &program.id)
        .await?
        .task
        .unwrap();
    svc.complete_task(OWNER, &task.id).await?;

    // Read back through the repository layer, not the in-memory copy.
    let evaluations = svc.task_evaluations(&task.id)?;
    assert_eq!(evaluations.len(), 1);
    let stored = &evaluations[0];

    let declared: Vec<&str> = stored.domain_scores.keys().map(|k| k.as_str()).collect();
    assert_eq!(declared, vec!["A", "B", "C"]);
    for score in stored.domain_scores.values() {
        assert!((0.0..=100.0).contains(score));
    }
    Ok(())
}

#[tokio::test]
async fn recomputation_replaces_the_aggregate_in_place() -> anyhow::Result<()> {
    let fixture = engine(
        vec![template("tpl", Mode::Pbl, &[&["A"]])],
        vec![Ok(outcome(&[("A", 30.0)], 30.0, 100.0))],
    );
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let task = svc
        .activate_program(OWNER, &program.id)
        .await?
        .task
        .unwrap();
    let completion = svc.complete_task(OWNER, &task.id).await?;

    let first = svc.program_evaluation(&program.id)?.unwrap();
    let recomputed = svc.recompute_program_aggregate(&completion.program)?;

    // Same identity, same totals: total replacement, not accumulation.
    assert_eq!(first.id, recomputed.id);
    assert_eq!(first.domain_scores, recomputed.domain_scores);
    assert_eq!(first.score, recomputed.score);
    Ok(())
}

#[tokio::test]
async fn single_task_program_aggregate_mirrors_its_task() -> anyhow::Result<()> {
    let fixture = engine(
        vec![template("tpl", Mode::Assessment, &[&["A"]])],
        vec![Ok(outcome(&[("A", 88.0)], 44.0, 50.0))],
    );
    let svc = &fixture.service;

    let scenario = svc.start_scenario(OWNER, "tpl").await?;
    let program = svc.start_program(OWNER, &scenario.id, Default::default()).await?;
    let task = svc
        .activate_program(OWNER, &program.id)
        .await?
        .task
        .unwrap();
    svc.complete_task(OWNER, &task.id).await?;

    let aggregate = svc.program_evaluation(&program.id)?.unwrap();
    assert_eq!(aggregate.domain_scores["A"], 88.0);
    assert_eq!(aggregate.score, 44.0);
    assert_eq!(aggregate.max_score, 50.0);
    Ok(())
}
