use std::io::Write as _;

use spark_client::prelude::*;

/// Prints tokens as they arrive.
struct Stdout;

impl RenderTarget for Stdout {
    fn append(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn replace(&mut self, text: &str) {
        println!();
        print!("{text}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let client = SparkClient::from_env()?;
    let request = ChatRequest::user(1, "Stream a short greeting.");

    let run = client.chat(&request, Stdout).await?;
    let report = run.wait().await;
    println!();

    match report.outcome.into_result()? {
        Some(record) => eprintln!("stored as chat {:?}", record.chat_id),
        None => eprintln!("stream ended without a final record"),
    }
    Ok(())
}
