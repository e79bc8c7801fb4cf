use dap::errors::ServerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MockAdapterError {
    #[error("DAP transport error: {0}")]
    Server(#[from] ServerError),
}

pub type Result<T> = std::result::Result<T, MockAdapterError>;
