mod cli;
mod demo;
mod infra;

use credit_origination::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
