use crate::errors::{AppError, AppResult};
use crate::models::{Issue, Progression, Todo};
use std::sync::{Arc, Mutex, MutexGuard};

/// Committed state of the list. `version` increases by one per applied mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoSnapshot {
    pub version: u64,
    pub todos: Vec<Todo>,
}

impl TodoSnapshot {
    pub fn issue(&self, parent_index: usize, issue_index: usize) -> Option<&Issue> {
        self.todos.get(parent_index)?.issues.get(issue_index)
    }
}

/// Ordered Todo/Issue hierarchy addressed by `(parent_index, issue_index)`.
///
/// Each mutation runs under one lock against the latest committed snapshot and commits a
/// replacement; snapshots handed out earlier are never modified. Addresses that no longer
/// exist are ignored and reported as `Ok(false)`.
#[derive(Debug, Default)]
pub struct TodoListModel {
    state: Mutex<Arc<TodoSnapshot>>,
}

impl TodoListModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AppResult<Arc<TodoSnapshot>> {
        Ok(Arc::clone(&*self.lock()?))
    }

    pub fn version(&self) -> AppResult<u64> {
        Ok(self.lock()?.version)
    }

    pub fn len(&self) -> AppResult<usize> {
        Ok(self.lock()?.todos.len())
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.lock()?.todos.is_empty())
    }

    pub fn issue(&self, parent_index: usize, issue_index: usize) -> AppResult<Option<Issue>> {
        Ok(self.lock()?.issue(parent_index, issue_index).cloned())
    }

    /// Appends `todo` as the last element and returns its index.
    pub fn append(&self, todo: Todo) -> AppResult<usize> {
        let index = self.commit(move |todos| {
            todos.push(todo);
            Some(todos.len() - 1)
        })?;
        index.ok_or_else(|| AppError::Internal("append did not commit".to_string()))
    }

    pub fn clear(&self) -> AppResult<()> {
        self.commit(|todos| {
            if todos.is_empty() {
                return None;
            }
            todos.clear();
            Some(())
        })?;
        Ok(())
    }

    /// Removes one issue; later issues of that todo shift down by one.
    pub fn remove_issue(&self, parent_index: usize, issue_index: usize) -> AppResult<bool> {
        let removed = self.commit(|todos| {
            let todo = todos.get_mut(parent_index)?;
            if issue_index >= todo.issues.len() {
                return None;
            }
            Some(todo.issues.remove(issue_index))
        })?;

        if removed.is_none() {
            tracing::debug!(parent_index, issue_index, "remove_issue ignored stale address");
        }
        Ok(removed.is_some())
    }

    /// Parses `raw` as a progression (`0`, `1` or `2`) and applies it.
    /// Invalid input is rejected before the list is touched.
    pub fn set_issue_progression(
        &self,
        parent_index: usize,
        issue_index: usize,
        raw: &str,
    ) -> AppResult<bool> {
        let value: Progression = raw.parse()?;
        self.apply_progression(parent_index, issue_index, value)
    }

    pub fn apply_progression(
        &self,
        parent_index: usize,
        issue_index: usize,
        value: Progression,
    ) -> AppResult<bool> {
        let applied = self.commit(|todos| {
            let slot = todos.get_mut(parent_index)?.issues.get_mut(issue_index)?;
            *slot = Issue {
                progression: value,
                ..slot.clone()
            };
            Some(())
        })?;

        if applied.is_none() {
            tracing::debug!(parent_index, issue_index, "progression change ignored stale address");
        }
        Ok(applied.is_some())
    }

    /// Runs `change` against the latest snapshot. `change` must leave the list untouched when it
    /// returns `None`; the version only moves on `Some`.
    fn commit<T>(&self, change: impl FnOnce(&mut Vec<Todo>) -> Option<T>) -> AppResult<Option<T>> {
        let mut state = self.lock()?;
        let snapshot = Arc::make_mut(&mut *state);
        let outcome = change(&mut snapshot.todos);
        if outcome.is_some() {
            snapshot.version += 1;
        }
        Ok(outcome)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Arc<TodoSnapshot>>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("todo list mutex poisoned".to_string()))
    }
}
