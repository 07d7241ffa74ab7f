use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    spending_sync::cli::run_spending_sync(std::env::args().skip(1))
}
