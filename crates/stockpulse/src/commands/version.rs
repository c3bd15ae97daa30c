pub fn run() -> anyhow::Result<()> {
    println!("stockpulse {}", env!("CARGO_PKG_VERSION"));
    println!("Client for long-running stock analysis tasks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_output() {
        let result = run();
        assert!(result.is_ok());
    }
}
