use std::fmt::Write as _;
use std::process::ExitCode;

use anyhow::Context as _;
use futures::StreamExt as _;
use spark_client::api::{BackendStatus, Capsule, ModelList, Project};
use spark_client::{ChatRequest, PullEvent, PullProgress, SessionState, SparkClient};
use tracing::{info, warn};

use crate::terminal::TerminalTarget;

const CAPSULE_PREVIEW_CHARS: usize = 80;

/// Exit code used when the user interrupts a reply.
const EXIT_INTERRUPTED: u8 = 130;

pub struct ChatArgs {
    pub project: i64,
    pub model: Option<String>,
    pub temperature: f32,
    pub system: Option<String>,
    pub text: String,
}

/// Streams one reply to stdout. Ctrl-C aborts the session.
pub async fn chat(client: &SparkClient, args: ChatArgs) -> anyhow::Result<ExitCode> {
    let mut request = ChatRequest::user(args.project, args.text).temperature(args.temperature);
    if let Some(model) = args.model {
        request = request.model(model);
    }
    if let Some(system) = args.system {
        request = request.system_prompt(system);
    }

    let run = client
        .chat(&request, TerminalTarget::stdout())
        .await
        .context("chat request failed")?;
    let abort = run.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let report = run.wait().await;
    interrupt.abort();
    report.target.finish().context("writing reply")?;

    let outcome = report.outcome;
    info!(session_id = %outcome.session_id, state = %outcome.state, tokens = outcome.tokens, "chat finished");
    Ok(match outcome.state {
        SessionState::Completed => ExitCode::SUCCESS,
        SessionState::Cancelled => {
            eprintln!("interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        _ => ExitCode::FAILURE,
    })
}

pub async fn status(client: &SparkClient) -> anyhow::Result<ExitCode> {
    let health = client.health().await.context("service unreachable")?;
    let status = client.status().await.context("status request failed")?;
    println!("PrivateSpark {}", health.version);
    print!("{}", format_status(&status));
    Ok(if status.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn models(client: &SparkClient, pull: Option<String>) -> anyhow::Result<ExitCode> {
    if let Some(name) = pull
        && !pull_model(client, &name).await?
    {
        return Ok(ExitCode::FAILURE);
    }
    let models = client.models().await.context("listing models")?;
    print!("{}", format_models(&models));
    Ok(ExitCode::SUCCESS)
}

/// Prints pull progress to stderr. Returns whether the pull finished.
async fn pull_model(client: &SparkClient, name: &str) -> anyhow::Result<bool> {
    let mut events = client.pull_model(name).await.context("starting model pull")?;
    let mut last = None;
    while let Some(event) = events.next().await {
        match event {
            Ok(PullEvent::Progress(progress)) => {
                let line = format_progress(&progress);
                if last.as_ref() != Some(&line) {
                    eprintln!("{line}");
                    last = Some(line);
                }
            }
            Ok(PullEvent::Done { model }) => {
                eprintln!("pulled {model}");
                return Ok(true);
            }
            Err(err) => {
                warn!(error = %err, model = name, "model pull failed");
                eprintln!("pull failed: {err}");
                return Ok(false);
            }
        }
    }
    eprintln!("pull stream ended before completion");
    Ok(false)
}

pub async fn projects(client: &SparkClient, create: Option<String>) -> anyhow::Result<ExitCode> {
    if let Some(name) = create {
        let project = client.create_project(&name).await.context("creating project")?;
        println!("created project {} ({})", project.id, project.name);
    }
    let projects = client.projects().await.context("listing projects")?;
    print!("{}", format_projects(&projects));
    Ok(ExitCode::SUCCESS)
}

pub async fn capsules(
    client: &SparkClient,
    project: i64,
    query: Option<String>,
) -> anyhow::Result<ExitCode> {
    let capsules = match query {
        Some(query) => client.search(project, &query).await.context("searching capsules")?,
        None => client.capsules(project).await.context("listing capsules")?,
    };
    print!("{}", format_capsules(&capsules));
    Ok(ExitCode::SUCCESS)
}

fn format_status(status: &BackendStatus) -> String {
    let mut out = String::new();
    if status.ok {
        let _ = writeln!(out, "● Ollama online");
    } else {
        let _ = writeln!(out, "● Ollama offline");
        let hint = status.hint.as_deref().unwrap_or(
            "install Ollama, run `ollama serve`, then `ollama pull llama3.1:latest`.",
        );
        let _ = writeln!(out, "setup tip: {hint}");
    }
    out
}

fn format_models(models: &ModelList) -> String {
    if models.models.is_empty() {
        let reason = models.message.as_deref().unwrap_or("No local models found");
        return format!("{reason}\n");
    }
    let mut out = String::new();
    for model in &models.models {
        let _ = writeln!(out, "{}", model.name);
    }
    out
}

fn format_progress(progress: &PullProgress) -> String {
    let status = progress.status.as_deref().unwrap_or("working");
    match progress.percent() {
        Some(percent) => format!("{status} {percent}%"),
        None => status.to_string(),
    }
}

fn format_projects(projects: &[Project]) -> String {
    let mut out = String::new();
    for project in projects {
        let _ = writeln!(out, "{:>5}  {}", project.id, project.name);
    }
    out
}

fn format_capsules(capsules: &[Capsule]) -> String {
    let mut out = String::new();
    for capsule in capsules {
        let preview = capsule
            .preview(CAPSULE_PREVIEW_CHARS)
            .replace(['\n', '\r'], " ");
        match capsule.score {
            Some(score) => {
                let _ = writeln!(out, "{} [{score:.2}] — {preview}", capsule.title);
            }
            None => {
                let _ = writeln!(out, "{} — {preview}", capsule.title);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule(title: &str, text: &str, score: Option<f64>) -> Capsule {
        Capsule {
            id: 1,
            title: title.into(),
            text: text.into(),
            created_at: None,
            score,
        }
    }

    #[test]
    fn offline_status_prints_setup_tip() {
        let status = BackendStatus {
            ok: false,
            url: None,
            hint: None,
        };
        let text = format_status(&status);
        assert!(text.starts_with("● Ollama offline\n"));
        assert!(text.contains("ollama serve"));
    }

    #[test]
    fn empty_model_list_explains_itself() {
        let models = ModelList {
            models: Vec::new(),
            message: Some("Ollama is not running.".into()),
        };
        assert_eq!(format_models(&models), "Ollama is not running.\n");
    }

    #[test]
    fn progress_shows_percent_when_sizes_are_known() {
        let mut progress = PullProgress {
            status: Some("downloading".into()),
            ..PullProgress::default()
        };
        assert_eq!(format_progress(&progress), "downloading");
        progress.total = Some(8);
        progress.completed = Some(2);
        assert_eq!(format_progress(&progress), "downloading 25%");
        assert_eq!(format_progress(&PullProgress::default()), "working");
    }

    #[test]
    fn capsule_lines_are_single_line_previews() {
        let long = format!("line one\nline two {}", "x".repeat(200));
        let text = format_capsules(&[
            capsule("notes.md", &long, None),
            capsule("plan.txt", "q3", Some(0.876)),
        ]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("notes.md — line one line two"));
        assert_eq!(lines[1], "plan.txt [0.88] — q3");
    }
}
