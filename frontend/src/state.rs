//! Local mirror of the task list with optimistic mutations.
//!
//! Every change is applied here first and then sent to the server. Each
//! in-flight request is tracked as a [`PendingMutation`] that settles as
//! confirmed or failed. Failed mutations are not rolled back: the local list
//! keeps the optimistic value until the next full reload via
//! [`TaskListState::replace_all`].
//!
//! Edits the server would reject are refused up front and never applied.
//! The failure log keeps at most [`MAX_FAILED_MUTATIONS`] entries.

use std::collections::BTreeMap;

use shared::{Task, TaskId, TaskPatch, ValidationError};

/// Oldest failures are evicted past this many.
pub const MAX_FAILED_MUTATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    Update { id: TaskId, patch: TaskPatch },
    Delete { task: Task },
}

impl MutationKind {
    pub fn task_id(&self) -> TaskId {
        match self {
            MutationKind::Update { id, .. } => *id,
            MutationKind::Delete { task } => task.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationStatus {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub kind: MutationKind,
    pub status: MutationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct TaskListState {
    tasks: Vec<Task>,
    mutations: BTreeMap<MutationId, PendingMutation>,
    next_mutation: u64,
}

impl TaskListState {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Resynchronises with a fresh server listing and forgets all mutation history.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.mutations.clear();
    }

    /// Appends a task the server has already created.
    pub fn add_confirmed(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Flips `completed` locally. The returned patch carries the negation of
    /// the value observed now, before any later local change.
    pub fn toggle(&mut self, id: TaskId) -> Option<(MutationId, TaskPatch)> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        let patch = TaskPatch::completed(!task.completed);
        task.apply(&patch);
        Some((self.track(MutationKind::Update { id, patch: patch.clone() }), patch))
    }

    /// Applies `patch` locally. Returns `Ok(None)` for an empty patch or an
    /// unknown task, and an error without touching the task when the patch
    /// would fail server-side validation.
    pub fn edit(
        &mut self,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Option<(MutationId, TaskPatch)>, ValidationError> {
        if patch.is_empty() {
            return Ok(None);
        }
        patch.validate()?;
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        task.apply(&patch);
        Ok(Some((self.track(MutationKind::Update { id, patch: patch.clone() }), patch)))
    }

    pub fn remove(&mut self, id: TaskId) -> Option<MutationId> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(index);
        Some(self.track(MutationKind::Delete { task }))
    }

    /// Marks a mutation as acknowledged by the server and drops it from the log.
    pub fn confirm(&mut self, mutation: MutationId) -> Option<PendingMutation> {
        let mut settled = self.mutations.remove(&mutation)?;
        settled.status = MutationStatus::Confirmed;
        Some(settled)
    }

    /// Records a failed request. Local state is left as it is.
    pub fn fail(&mut self, mutation: MutationId, reason: impl Into<String>) -> Option<&PendingMutation> {
        if !self.mutations.contains_key(&mutation) {
            return None;
        }
        let failed: Vec<MutationId> = self
            .mutations
            .iter()
            .filter(|(id, m)| **id != mutation && matches!(m.status, MutationStatus::Failed(_)))
            .map(|(id, _)| *id)
            .collect();
        let excess = (failed.len() + 1).saturating_sub(MAX_FAILED_MUTATIONS);
        for id in &failed[..excess] {
            self.mutations.remove(id);
        }

        let entry = self.mutations.get_mut(&mutation)?;
        entry.status = MutationStatus::Failed(reason.into());
        Some(entry)
    }

    pub fn mutation(&self, mutation: MutationId) -> Option<&PendingMutation> {
        self.mutations.get(&mutation)
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.mutations
            .values()
            .any(|m| m.status == MutationStatus::Pending && m.kind.task_id() == id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PendingMutation> {
        self.mutations
            .values()
            .filter(|m| matches!(m.status, MutationStatus::Failed(_)))
    }

    fn track(&mut self, kind: MutationKind) -> MutationId {
        let id = MutationId(self.next_mutation);
        self.next_mutation += 1;
        self.mutations.insert(
            id,
            PendingMutation {
                kind,
                status: MutationStatus::Pending,
            },
        );
        id
    }
}
