//! flowrun executor daemon

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flowrun_core::{Datum, TaskOption};
use flowrun_executor::config::{TaskArgs, DEFAULT_AGENT_ADDR};
use flowrun_executor::flows::{build_flow, FLOW_NAMES};
use flowrun_executor::json_output;
use flowrun_executor::{RunOutcome, TaskRunner};
use flowrun_netchan::{codec, AgentServer, ChannelBridge, MemoryBridge, TcpBridge};

/// flowrun executor - runs task groups and serves named channels
#[derive(Parser)]
#[command(name = "flowrun-executor")]
#[command(about = "Executor for flowrun task groups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve named channels over TCP
    Agent {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        listen: String,

        /// Emit JSON events on stdout
        #[arg(long)]
        json: bool,
    },

    /// Run one task group of a built-in flow
    Run {
        #[command(flatten)]
        task: TaskArgs,

        /// Address of the local channel agent
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        agent: String,

        /// Built-in flow to run
        #[arg(long, default_value = "uppercase")]
        flow: String,

        /// Emit JSON events on stdout
        #[arg(long)]
        json: bool,
    },

    /// Write stdin lines into a named channel
    Send {
        /// Address of the channel agent
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        agent: String,

        /// Channel name
        #[arg(short, long)]
        name: String,
    },

    /// Print the values of a named channel as lines
    Recv {
        /// Address of the channel agent
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        agent: String,

        /// Channel name
        #[arg(short, long)]
        name: String,

        /// Channel buffer size
        #[arg(long, default_value_t = 0)]
        buffer_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries data and JSON events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    match cli.command {
        Commands::Agent { listen, json } => {
            if json {
                json_output::enable_json_mode();
            }
            serve_agent(&listen).await?;
        }
        Commands::Run {
            task,
            agent,
            flow,
            json,
        } => {
            if json {
                json_output::enable_json_mode();
            }
            run_task_group(task.into(), &agent, &flow).await;
        }
        Commands::Send { agent, name } => {
            send_lines(&agent, &name).await?;
        }
        Commands::Recv {
            agent,
            name,
            buffer_size,
        } => {
            recv_lines(&agent, &name, buffer_size).await?;
        }
    }

    Ok(())
}

async fn serve_agent(listen: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(listen).await?;
    let addr = listener.local_addr()?.to_string();
    info!(addr = %addr, "Starting flowrun agent");
    json_output::emit_agent_listening(&addr);

    AgentServer::new(MemoryBridge::new()).serve(listener).await?;
    Ok(())
}

async fn run_task_group(option: TaskOption, agent: &str, flow: &str) {
    if !option.is_task_mode() {
        warn!("Both --flow-id and --task-group-id are required to run a task group");
        std::process::exit(2);
    }
    let Some(mut fc) = build_flow(flow, option.context_id()) else {
        error!(flow = %flow, available = ?FLOW_NAMES, "Unknown flow");
        std::process::exit(2);
    };

    info!(
        flow = %flow,
        context = %option.context_id(),
        group = %option.task_group_id(),
        agent = %agent,
        "Starting flowrun executor"
    );

    let mut runner = TaskRunner::new(option, Arc::new(TcpBridge::new(agent)));
    match runner.run(&mut fc).await {
        Ok(RunOutcome::Completed(report)) => {
            json_output::emit_run_completed(report, runner.status().snapshot());
        }
        Ok(RunOutcome::NotResponsible) => {
            json_output::emit_run_skipped(fc.id.get(), runner.option().context_id().get());
        }
        Err(e) => {
            // Half-wired pipelines are abandoned with the process
            error!(
                error = %e,
                resolution_failure = e.is_resolution_failure(),
                "Task group failed"
            );
            json_output::emit_run_failed(&e.to_string(), e.is_resolution_failure());
            std::process::exit(1);
        }
    }
}

async fn send_lines(agent: &str, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = TcpBridge::new(agent);
    let tracker = TaskTracker::new();
    let tx = bridge.resolve_local_write(name, &tracker).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut count = 0u64;
    while let Some(line) = lines.next_line().await? {
        if tx.send(codec::encode(&Datum::Text(line))?).await.is_err() {
            warn!(channel = %name, "Channel closed while sending");
            break;
        }
        count += 1;
    }
    drop(tx);

    tracker.close();
    tracker.wait().await;
    info!(channel = %name, count, "Sent values");
    Ok(())
}

async fn recv_lines(
    agent: &str,
    name: &str,
    buffer_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = TcpBridge::new(agent);
    let tracker = TaskTracker::new();
    let mut rx = bridge.resolve_local_read(name, buffer_size, &tracker).await?;

    let mut stdout = tokio::io::stdout();
    let mut count = 0u64;
    while let Some(bytes) = rx.recv().await {
        stdout.write_all(&bytes).await?;
        stdout.write_all(b"\n").await?;
        count += 1;
    }
    stdout.flush().await?;
    drop(rx);
    tracker.close();
    tracker.wait().await;
    info!(channel = %name, count, "Received values");
    Ok(())
}
