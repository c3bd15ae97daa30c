use std::time::Duration;
use stockpulse_tracker::{ModuleState, TaskPhase, TaskView};

use super::{runtime, Context};

const REPORT_EVERY: Duration = Duration::from_secs(2);

pub fn run(
    company: &str,
    kind: Option<&str>,
    force_refresh: bool,
    modules: &[String],
) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let kind = kind
        .unwrap_or(&ctx.settings.default_analysis_kind)
        .to_string();
    runtime()?.block_on(analyze(&ctx, company, &kind, force_refresh, modules))
}

async fn analyze(
    ctx: &Context,
    company: &str,
    kind: &str,
    force_refresh: bool,
    modules: &[String],
) -> anyhow::Result<()> {
    let orchestrator = ctx.orchestrator();
    let task_id = orchestrator
        .start_or_resume(company, kind, force_refresh)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    eprintln!("tracking task {} for {}", task_id, company);

    let finished = orchestrator.wait();
    tokio::pin!(finished);
    let mut ticker = tokio::time::interval(REPORT_EVERY);
    let view = loop {
        tokio::select! {
            view = &mut finished => break view,
            _ = ticker.tick() => eprintln!("{}", progress_line(&orchestrator.current_state())),
        }
    };

    match view.phase {
        TaskPhase::Completed => {}
        TaskPhase::Failed => {
            anyhow::bail!(view.error.unwrap_or_else(|| "analysis failed".to_string()))
        }
        phase => anyhow::bail!("tracking ended early ({:?})", phase),
    }

    if view.from_cache {
        eprintln!("result served from local cache");
    }
    let mut output = serde_json::json!({
        "task_id": task_id,
        "company": company,
        "analysis_type": kind,
        "from_cache": view.from_cache,
        "result": view.result,
    });

    if !modules.is_empty() {
        let mut loaded = serde_json::Map::new();
        for module_type in modules {
            // one module failing leaves the others untouched
            if let Err(e) = orchestrator.load_module(module_type).await {
                eprintln!("module {}: {}", module_type, e.user_message());
            }
        }
        let view = orchestrator.current_state();
        for module_type in modules {
            if let Some(slot) = view.module(module_type) {
                loaded.insert(module_type.clone(), module_json(&slot.state));
            }
        }
        output["modules"] = serde_json::Value::Object(loaded);
    } else {
        output["available_modules"] = serde_json::json!(view
            .modules
            .iter()
            .map(|m| m.module_type.as_str())
            .collect::<Vec<_>>());
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn progress_line(view: &TaskView) -> String {
    let mut line = format!("[{:>5.1}%] {:?}", view.display_progress, view.phase);
    if let Some(stage) = view
        .snapshot
        .as_ref()
        .map(|s| s.stage.as_str())
        .filter(|s| !s.is_empty())
    {
        line.push_str(&format!(" - {}", stage));
    }
    if let Some(notice) = &view.notice {
        line.push_str(&format!(" ({})", notice));
    }
    line
}

fn module_json(state: &ModuleState) -> serde_json::Value {
    match state {
        ModuleState::Loaded(data) => data.clone(),
        ModuleState::Failed(message) => serde_json::json!({ "error": message }),
        ModuleState::NotLoaded | ModuleState::Loading => serde_json::Value::Null,
    }
}
