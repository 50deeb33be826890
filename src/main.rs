//! jobscout - 命令行入口
//!
//! 初始化日志、加载配置、构建会话，然后运行行式 REPL：
//! 普通输入发起生成，/stop 取消，/clear 清空对话与指标，/quit 退出。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use jobscout::config::load_config;
use jobscout::react::ReactEvent;
use jobscout::{observability, ClearOptions, SessionBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let app_name = config.app.name.clone().unwrap_or_else(|| "jobscout".into());

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::new(config)
        .build()
        .context("Failed to build session")?
        .with_event_tx(event_tx);

    let printer = tokio::spawn(print_events(event_rx));

    println!("{app_name}: ask for jobs, e.g. \"Python jobs today\". Commands: /stop /clear /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match line.trim() {
            "/quit" => break,
            "/stop" => {
                session.cancel().await;
            }
            "/clear" => {
                session.clear(ClearOptions::CHAT | ClearOptions::META).await;
                println!("(cleared)");
            }
            _ => {
                session.set_prompt(line);
                session.generate().await;
            }
        }
    }

    session.cancel().await;
    drop(session);
    let _ = printer.await;
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ReactEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            ReactEvent::TextDelta { text } => {
                print!("{text}");
                let _ = stdout.flush();
            }
            ReactEvent::ToolCall { tool, args } => println!("\n[calling {tool} {args}]"),
            ReactEvent::ToolLimitReached { limit } => {
                println!("\n[tool call limit of {limit} reached]")
            }
            ReactEvent::Cancelled => println!("\n[cancelled]"),
            ReactEvent::Completion { tokens_per_second } => {
                tracing::debug!(tokens_per_second, "completion")
            }
            ReactEvent::Done => println!(),
            ReactEvent::Error { text } => eprintln!("\nerror: {text}"),
            ReactEvent::TurnStarted { .. } | ReactEvent::Observation { .. } => {}
        }
    }
}
