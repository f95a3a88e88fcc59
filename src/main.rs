use anyhow::Result;
use knowledgebase_mcp::{ServerConfig, logging, start_server};
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    let config = ServerConfig::from_env();
    logging::init(&config)?;

    // Create a Tokio runtime for async operations
    let rt = Runtime::new()?;

    rt.block_on(start_server(config))?;

    Ok(())
}
