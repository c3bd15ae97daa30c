use super::{runtime, Context};

pub fn run(task_id: &str) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let client = ctx.client();
    let snapshot = runtime()?
        .block_on(client.get_status(task_id))
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let mut output = serde_json::to_value(&snapshot)?;
    output["task_id"] = serde_json::json!(task_id);
    println!("{output}");
    Ok(())
}
