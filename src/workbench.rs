use crate::config::AppConfig;
use crate::db::{RecordStore, ScratchStore};
use crate::decomposition::DecompositionClient;
use crate::errors::AppResult;
use crate::models::{DisassembleResponse, NewTodoRecord, Progression};
use crate::todo_list::TodoListModel;
use chrono::Utc;

pub const DRAFT_KEY: &str = "draft_resource";

pub struct Workbench<C> {
    model: TodoListModel,
    records: RecordStore,
    scratch: ScratchStore,
    client: C,
}

impl<C: DecompositionClient> Workbench<C> {
    /// Opens the scratch namespace and initialises the record store.
    pub async fn open(config: &AppConfig, client: C) -> AppResult<Self> {
        let scratch_path = config.scratch_path();
        let scratch =
            tokio::task::spawn_blocking(move || ScratchStore::open(&scratch_path)).await??;
        let records = RecordStore::new(&config.database_path(), config.schema_version);
        records.init().await?;

        Ok(Self {
            model: TodoListModel::new(),
            records,
            scratch,
            client,
        })
    }

    pub fn model(&self) -> &TodoListModel {
        &self.model
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn scratch(&self) -> &ScratchStore {
        &self.scratch
    }

    /// Decomposes `resource` and appends the resulting todo. A failed call changes nothing.
    pub async fn disassemble(&self, resource: &str) -> AppResult<DisassembleResponse> {
        let decomposition = match self.client.decompose(resource).await {
            Ok(decomposition) => decomposition,
            Err(error) => {
                tracing::warn!(error = %error, "decomposition failed");
                return Err(error);
            }
        };

        let mut todo = decomposition.todo;
        todo.sanitize();
        if todo.created_at.is_none() {
            todo.created_at = Some(Utc::now().to_rfc3339());
        }
        let index = self.model.append(todo)?;

        if let Err(error) = self.scratch.delete(DRAFT_KEY) {
            tracing::warn!(error = %error, "failed to clear saved draft");
        }

        Ok(DisassembleResponse {
            model: decomposition.model,
            index,
        })
    }

    pub fn save_draft(&self, text: &str) -> AppResult<()> {
        self.scratch.set(DRAFT_KEY, text)
    }

    pub fn draft(&self) -> AppResult<String> {
        self.scratch.get_as(DRAFT_KEY)
    }

    pub fn remove_issue(&self, parent_index: usize, issue_index: usize) -> AppResult<bool> {
        self.model.remove_issue(parent_index, issue_index)
    }

    pub fn set_issue_progression(
        &self,
        parent_index: usize,
        issue_index: usize,
        raw: &str,
    ) -> AppResult<bool> {
        let progression: Progression = raw.parse()?;
        let applied = self
            .model
            .apply_progression(parent_index, issue_index, progression)?;
        if applied {
            tracing::debug!(
                parent_index,
                issue_index,
                progression = progression.as_str(),
                "issue progression changed"
            );
        }
        Ok(applied)
    }

    /// Persists the todo at `index` as `{ title, completed }`. Unknown indices yield `None`.
    pub async fn archive_todo(&self, index: usize) -> AppResult<Option<i64>> {
        let snapshot = self.model.snapshot()?;
        let Some(todo) = snapshot.todos.get(index) else {
            return Ok(None);
        };

        let record = NewTodoRecord {
            title: todo.title.clone().unwrap_or_default(),
            completed: todo.is_completed(),
        };
        let id = self.records.add(record).await?;
        let done = todo
            .issues
            .iter()
            .filter(|issue| issue.progression == Progression::Done)
            .count();
        tracing::info!(id, index, done, total = todo.issues.len(), "todo archived");
        Ok(Some(id))
    }
}
