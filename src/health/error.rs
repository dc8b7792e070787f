use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("http probe `{0}` failed: `{1}`")]
    Http(String, String),
    #[error("http probe `{0}` returned unexpected status {1}")]
    HttpStatus(String, u16),
    #[error("tcp probe `{0}` failed to connect: `{1}`")]
    Tcp(String, std::io::Error),
    #[error("command probe `{0}` failed to run: `{1}`")]
    CommandSpawn(String, std::io::Error),
    #[error("command probe `{0}` exited with status {1}")]
    CommandFailed(String, i32),
    #[error("probe `{0}` timed out")]
    Timeout(String),
    #[error("probe `{0}` cancelled")]
    Cancelled(String),
}
