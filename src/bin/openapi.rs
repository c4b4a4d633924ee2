use anyhow::Result;

// Print the OpenAPI document for the gateway routes
fn main() -> Result<()> {
    println!("{}", sapgate::sapgate::openapi().to_pretty_json()?);

    Ok(())
}
