use aminoverse::client::api::ApiClient;
use aminoverse::client::layout::Viewport;
use aminoverse::client::orchestrator::{ FollowUpPolicy, Orchestrator };
use aminoverse::client::pane::{ PaneContent, PaneState, Phase };
use aminoverse::client::status_panel::StatusPanel;
use aminoverse::client::tabs::Tab;
use aminoverse::sources::build_http_client;
use clap::Parser;
use dotenv::dotenv;
use log::error;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal chat client for the AminoVerse API", long_about = None)]
struct ChatArgs {
    /// Base URL of the API, including its prefix.
    #[arg(long, env = "AMINOVERSE_API_URL", default_value = "http://localhost:8000/api")]
    api_url: String,

    /// Seconds each follow-up fetch may take before its pane is marked failed.
    #[arg(long, env = "FOLLOW_UP_TIMEOUT", default_value = "15")]
    follow_up_timeout: u64,

    /// Size of the virtual viewport used to lay out graph panes.
    #[arg(long, default_value = "100")]
    width: u32,

    #[arg(long, default_value = "40")]
    height: u32,
}

const HELP: &str = "Commands: /status, /tab <structure|network|kg>, /resize <width> <height>, /history, /help, /quit";

fn parse_viewport(args: &str) -> Option<Viewport> {
    let (width, height) = args.split_once(|c: char| c == 'x' || c.is_whitespace())?;
    Some(Viewport::new(width.trim().parse().ok()?, height.trim().parse().ok()?))
}

fn describe_pane(tab: Tab, pane: &PaneState) -> String {
    let body = match (&pane.phase, &pane.content) {
        (Phase::Rendered | Phase::Loaded, Some(PaneContent::Structure { viewer, fields })) => {
            let mut lines = vec![format!("viewer: {}", viewer.url)];
            lines.extend(fields.iter().map(|f| format!("  {}: {}", f.name, f.value)));
            lines.join("\n")
        }
        (Phase::Rendered | Phase::Loaded, Some(PaneContent::Graph(graph))) => {
            let layout = pane.layout
                .as_ref()
                .map(|l| format!(" ({} layout)", l.engine))
                .unwrap_or_default();
            let mut lines = vec![format!("{} nodes, {} edges{}", graph.nodes.len(), graph.edges.len(), layout)];
            for edge in graph.edges.iter().take(10) {
                let score = edge.score.map(|s| format!(" {:.2}", s)).unwrap_or_default();
                lines.push(format!("  {} -[{}]-> {}{}", edge.source, edge.edge_type, edge.target, score));
            }
            lines.join("\n")
        }
        (Phase::NoData { reason }, _) => format!("no data: {}", reason),
        (Phase::Failed { error, fallback_url }, _) =>
            match fallback_url {
                Some(url) => format!("failed: {} (try {})", error, url),
                None => format!("failed: {}", error),
            }
        (phase, _) => format!("{:?}", phase).to_lowercase(),
    };
    format!("[{}]\n{}", tab, body)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = ChatArgs::parse();

    let http = build_http_client(args.follow_up_timeout.max(30))?;
    let backend = Arc::new(ApiClient::new(http, &args.api_url));
    let policy = FollowUpPolicy {
        timeout: Duration::from_secs(args.follow_up_timeout.max(1)),
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(backend.clone(), Viewport::new(args.width, args.height), policy);

    println!("{}", StatusPanel::poll(backend.as_ref()).await);
    println!("Ask about a protein, e.g. \"Tell me about TP53\". {}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ').map(|(c, rest)| (c, rest.trim())).unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{}", HELP),
            ("/status", _) => println!("{}", StatusPanel::poll(backend.as_ref()).await),
            ("/history", _) => {
                for message in orchestrator.history() {
                    println!("{}: {}", message.role, message.content);
                }
            }
            ("/tab", name) =>
                match name.parse::<Tab>() {
                    Ok(tab) => {
                        orchestrator.switch_to(tab).await;
                        println!("{}", describe_pane(tab, orchestrator.tabs().pane(tab)));
                    }
                    Err(e) => println!("{}", e),
                }
            ("/resize", size) =>
                match parse_viewport(size) {
                    Some(viewport) => {
                        orchestrator.resize(viewport).await;
                        let active = orchestrator.tabs().active();
                        println!("{}", describe_pane(active, orchestrator.tabs().pane(active)));
                    }
                    None => println!("Usage: /resize <width> <height>"),
                }
            _ => {
                match orchestrator.submit(line).await {
                    Ok(reply) => {
                        println!("\n{}\n", reply.message);
                        let active = orchestrator.tabs().active();
                        println!("{}", describe_pane(active, orchestrator.tabs().pane(active)));
                        for suggestion in &reply.follow_up_suggestions {
                            println!("  > {}", suggestion);
                        }
                    }
                    Err(e) => error!("{}", e),
                }
            }
        }
    }
    Ok(())
}
