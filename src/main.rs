//! PDF → AF 转换服务与命令行
//!
//! ## 服务模式
//! ```bash
//! pdf-af serve --port 5001
//! ```
//!
//! ## 命令行模式
//! ```bash
//! pdf-af convert --file ABCD.pdf
//! pdf-af convert --dir ./forms --continue-on-error
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pdf_af_converter::cli::{self, ConvertInput};
use pdf_af_converter::utils::logging;
use pdf_af_converter::{api, Config, SessionStatus};

#[derive(Parser)]
#[command(name = "pdf-af")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert scanned PDF forms into Adaptive Form packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// 监听端口
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// 直接转换一个文件或一个目录
    Convert {
        /// 单个 PDF 文件
        #[arg(long, conflicts_with = "dir", required_unless_present = "dir")]
        file: Option<PathBuf>,

        /// 包含 PDF 的目录
        #[arg(long, conflicts_with = "file")]
        dir: Option<PathBuf>,

        /// 某个文件失败时继续处理其余文件
        #[arg(long)]
        continue_on_error: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::from_env();

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            api::run_server(config).await?;
        }
        Commands::Convert {
            file,
            dir,
            continue_on_error,
        } => {
            let input = match (file, dir) {
                (Some(file), _) => ConvertInput::File(file),
                (None, Some(dir)) => ConvertInput::Dir(dir),
                (None, None) => bail!("需要 --file 或 --dir"),
            };
            let report = cli::convert(config, input, continue_on_error).await?;
            if report.status != SessionStatus::Completed {
                bail!(
                    "转换未完成 ({}): {}",
                    report.status,
                    report.error_message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
