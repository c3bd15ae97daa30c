use stockpulse_store::CacheStats;

use super::Context;

fn format_stats(stats: &CacheStats) -> String {
    format!(
        "Entries: {}\n\
         Size: {:.1} KB\n\
         Expired: {}",
        stats.count,
        stats.total_bytes as f64 / 1024.0,
        stats.expired_count
    )
}

pub fn run_stats() -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let stats = ctx.cache().stats();
    if stats.count == 0 {
        println!("Cache is empty");
        return Ok(());
    }
    println!("{}", format_stats(&stats));
    Ok(())
}

pub fn run_sweep() -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let removed = ctx.cache().sweep_expired();
    println!("Removed {} expired entries", removed);
    Ok(())
}

pub fn run_clear() -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let removed = ctx.cache().clear();
    println!("Removed {} entries", removed);
    Ok(())
}
