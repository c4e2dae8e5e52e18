use anyhow::Result;

fn main() -> Result<()> {
    treebox::cli::run()
}
