pub mod shell;
pub mod status;

// Single dispatch point for `Action`.
mod run;

#[derive(Debug)]
pub enum Action {
    Shell(shell::Args),
    Status(status::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
