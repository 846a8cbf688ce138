//! Progression Service
//!
//! The lifecycle orchestrator: scenario start, program activation, interaction
//! appends, task completion, and upward score aggregation. This is the only
//! component allowed to mutate cross-entity state; repositories never cascade.
//! Correctness under concurrent requests rides entirely on conditional writes,
//! so no lock is held across storage or evaluator calls.

pub mod aggregate;

use crate::content::ContentSource;
use crate::entity::{
    Actor, Evaluation, Program, ProgramSettings, ProgramStatus, Scenario, ScenarioStatus, Task,
    TaskStatus, Template,
};
use crate::error::{EngineError, StorageError};
use crate::evaluator::{validate_outcome, EvaluationRequest, Evaluator};
use crate::repository::{BackendHealth, ListFilter, RepositoryFactory};
use crate::types::{now, EntityKind};
use aggregate::{aggregate, ScoredTask};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// A program together with the task the learner should be working.
#[derive(Debug, Clone)]
pub struct ProgramState {
    pub program: Program,
    pub task: Option<Task>,
}

/// Result of completing (or re-completing) a task.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task: Task,
    pub evaluation: Evaluation,
    pub program: Program,
}

pub struct ProgressionService {
    repos: Arc<RepositoryFactory>,
    content: Arc<dyn ContentSource>,
    evaluator: Arc<dyn Evaluator>,
}

impl ProgressionService {
    pub fn new(
        repos: Arc<RepositoryFactory>,
        content: Arc<dyn ContentSource>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            repos,
            content,
            evaluator,
        }
    }

    /// Start (or, for singleton modes, re-enter) a scenario for a template.
    ///
    /// PBL keeps at most one active scenario per (owner, template): starting
    /// the same template again returns the existing scenario. Discovery and
    /// Assessment always create a fresh attempt.
    pub async fn start_scenario(
        &self,
        owner: &str,
        template_id: &str,
    ) -> Result<Scenario, EngineError> {
        let template = self.content.template(template_id).await?;
        let scenarios = self.repos.scenarios();

        if template.mode.singleton_progress() {
            if let Some(existing) = self.find_active_scenario(owner, template_id)? {
                debug!(scenario = %existing.id, "re-entering active scenario");
                return Ok(existing);
            }
        }

        let scenario = Scenario::new(owner, &template);
        scenarios.create(&scenario)?;
        let scenario = scenarios.update_with(owner, &scenario.id, |s| {
            transition_scenario(s, ScenarioStatus::Active, "start")
        })?;
        info!(
            scenario = %scenario.id,
            template = %template_id,
            mode = template.mode.as_str(),
            "scenario started"
        );
        Ok(scenario)
    }

    /// Append a pending program (next attempt ordinal) to an active scenario.
    pub async fn start_program(
        &self,
        owner: &str,
        scenario_id: &str,
        settings: ProgramSettings,
    ) -> Result<Program, EngineError> {
        let scenario = self.repos.scenarios().get(owner, scenario_id)?;
        if scenario.status != ScenarioStatus::Active {
            return Err(EngineError::InvalidTransition {
                kind: EntityKind::Scenario,
                id: scenario.id.clone(),
                op: "start a program",
                from: scenario.status.as_str().to_string(),
            });
        }
        let template = self.content.template(&scenario.template).await?;

        // Attempts keep their ordinal even when soft-deleted.
        let ordinal = self
            .repos
            .programs()
            .find_all(owner, &ListFilter::with_deleted())?
            .iter()
            .filter(|p| p.scenario == scenario_id)
            .map(|p| p.ordinal + 1)
            .max()
            .unwrap_or(0);

        let program = Program::new(&scenario, ordinal, template.task_count(), settings);
        self.repos.programs().create(&program)?;
        debug!(program = %program.id, scenario = %scenario_id, ordinal, "program created");
        Ok(program)
    }

    /// Activate a pending program, materializing its first task.
    ///
    /// Claims the scenario's single active-program slot by conditional write:
    /// the loser of a concurrent activation race sees `AlreadyActive`.
    /// Re-activating an already-active program returns its current state
    /// without materializing anything.
    pub async fn activate_program(
        &self,
        owner: &str,
        program_id: &str,
    ) -> Result<ProgramState, EngineError> {
        let programs = self.repos.programs();
        let program = programs.get(owner, program_id)?;

        if program.status == ProgramStatus::Active {
            let task = self.active_task(owner, program_id)?;
            return Ok(ProgramState { program, task });
        }
        if program.status != ProgramStatus::Pending {
            return Err(EngineError::InvalidTransition {
                kind: EntityKind::Program,
                id: program.id.clone(),
                op: "activate",
                from: program.status.as_str().to_string(),
            });
        }

        let scenario = self
            .repos
            .scenarios()
            .update_with(owner, &program.scenario, |s| match &s.active_program {
                Some(active) if active != program_id => Err(EngineError::AlreadyActive {
                    scenario: s.id.clone(),
                    active: active.clone(),
                }),
                _ => {
                    s.active_program = Some(program_id.to_string());
                    s.last_active_at = now();
                    Ok(())
                }
            })?;

        // Lazy materialization; a retried half-applied activation reuses the
        // task it created last time.
        let template = self.content.template(&scenario.template).await?;
        let task = match self.task_at(owner, program_id, 0)? {
            Some(task) => task,
            None => self.materialize_task(&program, 0, &template)?,
        };

        let program = programs.update_with(owner, program_id, |p| {
            if p.status == ProgramStatus::Active {
                return Ok(());
            }
            transition_program(p, ProgramStatus::Active, "activate")?;
            p.started_at = Some(now());
            Ok(())
        })?;

        info!(program = %program.id, scenario = %program.scenario, "program activated");
        Ok(ProgramState {
            program,
            task: Some(task),
        })
    }

    /// Append one interaction to an active task's log.
    ///
    /// The append-only-under-contention protocol: read the current log and
    /// version, append, write conditionally, retry on a lost race. Submission
    /// order per task is preserved and no interaction is silently dropped.
    pub fn append_interaction(
        &self,
        owner: &str,
        task_id: &str,
        actor: Actor,
        content: serde_json::Value,
    ) -> Result<Task, EngineError> {
        self.repos.tasks().update_with(owner, task_id, |task| {
            if task.status != TaskStatus::Active {
                return Err(EngineError::InvalidTransition {
                    kind: EntityKind::Task,
                    id: task.id.clone(),
                    op: "record an interaction",
                    from: task.status.as_str().to_string(),
                });
            }
            task.record_interaction(actor, content.clone());
            Ok(())
        })
    }

    /// Complete an active task: evaluate, persist the evaluation, advance.
    ///
    /// Idempotent: completing an already-completed task returns the
    /// evaluation recorded the first time, without calling the evaluator
    /// again. If the evaluator fails, the task stays active and nothing is
    /// written; completion is never granted without a persisted evaluation.
    pub async fn complete_task(
        &self,
        owner: &str,
        task_id: &str,
    ) -> Result<TaskCompletion, EngineError> {
        let tasks = self.repos.tasks();
        let task = tasks.get(owner, task_id)?;

        match task.status {
            TaskStatus::Completed => {
                let evaluation = self.recorded_evaluation(&task)?;
                let program = self.repos.programs().get(owner, &task.program)?;
                return Ok(TaskCompletion {
                    task,
                    evaluation,
                    program,
                });
            }
            TaskStatus::Active => {}
            status => {
                return Err(EngineError::InvalidTransition {
                    kind: EntityKind::Task,
                    id: task.id.clone(),
                    op: "complete",
                    from: status.as_str().to_string(),
                });
            }
        }

        let program = self.repos.programs().get(owner, &task.program)?;
        let outcome = self
            .evaluator
            .evaluate(EvaluationRequest {
                interactions: &task.interactions,
                domains: &task.domains,
                ksa_codes: &task.ksa_codes,
                language: &program.settings.language,
            })
            .await?;
        validate_outcome(&outcome, &task.domains)?;

        let evaluation = Evaluation::for_task(
            &task.id,
            outcome.score,
            outcome.max_score,
            outcome.domain_scores,
            outcome.rubric_scores,
            outcome.feedback,
        );
        self.repos.evaluations().create(&evaluation)?;

        let task = tasks.update_with(owner, task_id, |t| {
            if t.status == TaskStatus::Completed {
                // Lost a completion race; the first evaluation stands.
                return Ok(());
            }
            transition_task(t, TaskStatus::Completed, "complete")?;
            t.completed_at = Some(now());
            t.evaluation = Some(evaluation.id.clone());
            Ok(())
        })?;

        let evaluation = if task.evaluation.as_deref() == Some(evaluation.id.as_str()) {
            evaluation
        } else {
            self.recorded_evaluation(&task)?
        };

        let program = self.advance_after(&task).await?;
        info!(task = %task.id, program = %program.id, "task completed");
        Ok(TaskCompletion {
            task,
            evaluation,
            program,
        })
    }

    /// Skip an active task, then advance exactly as completion would.
    pub async fn skip_task(&self, owner: &str, task_id: &str) -> Result<Program, EngineError> {
        let task = self.repos.tasks().update_with(owner, task_id, |t| {
            transition_task(t, TaskStatus::Skipped, "skip")
        })?;
        info!(task = %task.id, "task skipped");
        self.advance_after(&task).await
    }

    /// Abandon a pending or active program, releasing the scenario's slot.
    pub fn abandon_program(&self, owner: &str, program_id: &str) -> Result<Program, EngineError> {
        let program = self.repos.programs().update_with(owner, program_id, |p| {
            transition_program(p, ProgramStatus::Skipped, "abandon")
        })?;
        self.release_active_slot(&program)?;
        info!(program = %program.id, "program abandoned");
        Ok(program)
    }

    /// Mark a scenario completed. Rejected while a program is still active.
    pub fn complete_scenario(&self, owner: &str, scenario_id: &str) -> Result<Scenario, EngineError> {
        self.repos.scenarios().update_with(owner, scenario_id, |s| {
            if let Some(active) = &s.active_program {
                return Err(EngineError::AlreadyActive {
                    scenario: s.id.clone(),
                    active: active.clone(),
                });
            }
            transition_scenario(s, ScenarioStatus::Completed, "complete")
        })
    }

    /// Abandon a scenario; an in-flight program is skipped along with it.
    pub fn abandon_scenario(&self, owner: &str, scenario_id: &str) -> Result<Scenario, EngineError> {
        let scenario = self.repos.scenarios().update_with(owner, scenario_id, |s| {
            transition_scenario(s, ScenarioStatus::Abandoned, "abandon")
        })?;

        if let Some(active) = scenario.active_program.clone() {
            self.repos.programs().update_with(owner, &active, |p| {
                if p.status.is_terminal() {
                    return Ok(());
                }
                transition_program(p, ProgramStatus::Skipped, "abandon")
            })?;
            return self.repos.scenarios().update_with(owner, scenario_id, |s| {
                s.active_program = None;
                Ok(())
            });
        }
        Ok(scenario)
    }

    /// Current scenario state.
    pub fn scenario_state(&self, owner: &str, scenario_id: &str) -> Result<Scenario, EngineError> {
        self.repos.scenarios().get(owner, scenario_id)
    }

    /// Current program state: the program plus its active task, if any.
    pub fn program_state(&self, owner: &str, program_id: &str) -> Result<ProgramState, EngineError> {
        let program = self.repos.programs().get(owner, program_id)?;
        let task = self.active_task(owner, program_id)?;
        Ok(ProgramState { program, task })
    }

    /// The program-level aggregate, if the program has been scored.
    pub fn program_evaluation(&self, program_id: &str) -> Result<Option<Evaluation>, EngineError> {
        self.repos.evaluations().find_by_id(program_id, program_id)
    }

    /// All evaluations recorded for a task, oldest first.
    pub fn task_evaluations(&self, task_id: &str) -> Result<Vec<Evaluation>, EngineError> {
        let mut evaluations = self
            .repos
            .evaluations()
            .find_all(task_id, &ListFilter::default())?;
        evaluations.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(evaluations)
    }

    /// Tasks of a program in ordinal order.
    pub fn program_tasks(&self, owner: &str, program_id: &str) -> Result<Vec<Task>, EngineError> {
        self.tasks_for_program(owner, program_id)
    }

    /// Per-backend reachability of the storage layer.
    pub fn health(&self) -> Vec<BackendHealth> {
        self.repos.health_check()
    }

    // --- internals ---

    fn find_active_scenario(
        &self,
        owner: &str,
        template_id: &str,
    ) -> Result<Option<Scenario>, EngineError> {
        let scenarios = self
            .repos
            .scenarios()
            .find_all(owner, &ListFilter::default())?;
        Ok(scenarios
            .into_iter()
            .filter(|s| s.template == template_id && s.status == ScenarioStatus::Active)
            .max_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id))))
    }

    fn tasks_for_program(&self, owner: &str, program_id: &str) -> Result<Vec<Task>, EngineError> {
        let mut tasks: Vec<Task> = self
            .repos
            .tasks()
            .find_all(owner, &ListFilter::default())?
            .into_iter()
            .filter(|t| t.program == program_id)
            .collect();
        tasks.sort_by_key(|t| t.ordinal);
        Ok(tasks)
    }

    fn task_at(
        &self,
        owner: &str,
        program_id: &str,
        ordinal: u32,
    ) -> Result<Option<Task>, EngineError> {
        Ok(self
            .tasks_for_program(owner, program_id)?
            .into_iter()
            .find(|t| t.ordinal == ordinal))
    }

    fn active_task(&self, owner: &str, program_id: &str) -> Result<Option<Task>, EngineError> {
        Ok(self
            .tasks_for_program(owner, program_id)?
            .into_iter()
            .find(|t| t.status == TaskStatus::Active))
    }

    /// Create and activate the task at `ordinal` from its template blueprint.
    ///
    /// Enforces ordinal contiguity (tasks are only ever appended) and the
    /// predecessor rule: every lower-ordinal task must be terminal before the
    /// new one activates.
    fn materialize_task(
        &self,
        program: &Program,
        ordinal: u32,
        template: &Template,
    ) -> Result<Task, EngineError> {
        let blueprint = template.blueprint(ordinal).ok_or_else(|| {
            EngineError::Content(format!(
                "template {} has no blueprint at ordinal {ordinal}",
                template.id
            ))
        })?;

        let existing = self.tasks_for_program(&program.owner, &program.id)?;
        let slot_taken = existing.iter().any(|t| t.ordinal == ordinal);
        if !slot_taken {
            if existing.len() as u32 != ordinal {
                return Err(EngineError::Conflict {
                    entity: format!("{}/task@{ordinal}", program.id),
                });
            }
            if let Some(open) = existing.iter().find(|t| !t.status.is_terminal()) {
                return Err(EngineError::InvalidTransition {
                    kind: EntityKind::Task,
                    id: open.id.clone(),
                    op: "activate a successor",
                    from: open.status.as_str().to_string(),
                });
            }
        }

        let task = Task::materialize(program, ordinal, blueprint);
        if !slot_taken {
            match self.repos.tasks().create(&task) {
                Ok(_) => {}
                // The slot id is deterministic per (program, ordinal): a lost
                // create race means another writer materialized this slot
                // first, and its task is adopted below.
                Err(EngineError::Conflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        let task = self.repos.tasks().update_with(&task.owner, &task.id, |t| {
            if t.status == TaskStatus::Active {
                return Ok(());
            }
            transition_task(t, TaskStatus::Active, "activate")?;
            t.activated_at = Some(now());
            Ok(())
        })?;
        debug!(task = %task.id, program = %program.id, ordinal, "task materialized");
        Ok(task)
    }

    /// Shared advancement tail for completion and skip: refresh the progress
    /// counter, then either materialize the next task or close the program.
    /// Every step re-reads current state, so a repeated call settles into the
    /// same result instead of duplicating work.
    async fn advance_after(&self, task: &Task) -> Result<Program, EngineError> {
        let owner = &task.owner;
        let program = self.repos.programs().update_with(owner, &task.program, |p| {
            let completed = self
                .tasks_for_program(owner, &task.program)?
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count() as u32;
            p.completed_tasks = completed;
            Ok(())
        })?;

        let next_ordinal = task.ordinal + 1;
        if next_ordinal < program.total_tasks {
            if self.task_at(owner, &task.program, next_ordinal)?.is_none() {
                let scenario = self.repos.scenarios().get(owner, &program.scenario)?;
                let template = self.content.template(&scenario.template).await?;
                self.materialize_task(&program, next_ordinal, &template)?;
            }
            return Ok(program);
        }

        let program = self.repos.programs().update_with(owner, &program.id, |p| {
            if p.status == ProgramStatus::Completed {
                return Ok(());
            }
            transition_program(p, ProgramStatus::Completed, "complete")?;
            p.completed_at = Some(now());
            Ok(())
        })?;
        self.release_active_slot(&program)?;
        self.recompute_program_aggregate(&program)?;
        info!(
            program = %program.id,
            completed_tasks = program.completed_tasks,
            "program completed"
        );
        Ok(program)
    }

    fn release_active_slot(&self, program: &Program) -> Result<(), EngineError> {
        self.repos
            .scenarios()
            .update_with(&program.owner, &program.scenario, |s| {
                if s.active_program.as_deref() == Some(program.id.as_str()) {
                    s.active_program = None;
                }
                s.last_active_at = now();
                Ok(())
            })?;
        Ok(())
    }

    /// Rebuild the program-level evaluation from all completed tasks and
    /// replace the stored aggregate wholesale.
    pub fn recompute_program_aggregate(
        &self,
        program: &Program,
    ) -> Result<Evaluation, EngineError> {
        let tasks = self.tasks_for_program(&program.owner, &program.id)?;
        let mut pairs: Vec<(Task, Evaluation)> = Vec::new();
        for task in tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed)
        {
            let evaluation = self.recorded_evaluation(&task)?;
            pairs.push((task, evaluation));
        }

        let scored: Vec<ScoredTask<'_>> = pairs
            .iter()
            .map(|(task, evaluation)| ScoredTask { task, evaluation })
            .collect();
        let totals = aggregate(&scored);

        let feedback = json!({
            "task_evaluations": pairs
                .iter()
                .map(|(task, evaluation)| json!({ "task": task.id, "evaluation": evaluation.id }))
                .collect::<Vec<_>>(),
        });
        let record = Evaluation::for_program(
            &program.id,
            totals.score,
            totals.max_score,
            totals.domain_scores,
            totals.rubric_scores,
            feedback,
        );
        self.repos.evaluations().replace(&record)?;
        Ok(record)
    }

    fn recorded_evaluation(&self, task: &Task) -> Result<Evaluation, EngineError> {
        match &task.evaluation {
            Some(id) => self.repos.evaluations().get(&task.id, id),
            None => Err(StorageError::CorruptRecord {
                key: format!("{}/task/{}", task.owner, task.id),
                reason: "completed task records no evaluation".to_string(),
            }
            .into()),
        }
    }
}

fn transition_scenario(
    scenario: &mut Scenario,
    to: ScenarioStatus,
    op: &'static str,
) -> Result<(), EngineError> {
    if !scenario.status.can_transition(to) {
        return Err(EngineError::InvalidTransition {
            kind: EntityKind::Scenario,
            id: scenario.id.clone(),
            op,
            from: scenario.status.as_str().to_string(),
        });
    }
    scenario.status = to;
    Ok(())
}

fn transition_program(
    program: &mut Program,
    to: ProgramStatus,
    op: &'static str,
) -> Result<(), EngineError> {
    if !program.status.can_transition(to) {
        return Err(EngineError::InvalidTransition {
            kind: EntityKind::Program,
            id: program.id.clone(),
            op,
            from: program.status.as_str().to_string(),
        });
    }
    program.status = to;
    Ok(())
}

fn transition_task(task: &mut Task, to: TaskStatus, op: &'static str) -> Result<(), EngineError> {
    if !task.status.can_transition(to) {
        return Err(EngineError::InvalidTransition {
            kind: EntityKind::Task,
            id: task.id.clone(),
            op,
            from: task.status.as_str().to_string(),
        });
    }
    task.status = to;
    Ok(())
}
