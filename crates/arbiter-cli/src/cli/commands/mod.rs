pub mod proxy;
pub mod verify_token;

use super::args::{Cli, Command};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.config.as_deref();
    match cli.cmd {
        Command::Proxy(args) => proxy::run(args, config).await,
        Command::VerifyToken(args) => verify_token::run(args, config).await,
    }
}
