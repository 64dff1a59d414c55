pub mod server;

use anyhow::Result;

pub enum Action {
    Server(server::Args),
}

impl Action {
    /// # Errors
    /// Returns an error if the action fails to execute.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
        }
    }
}
