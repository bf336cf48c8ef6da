use mws_client::{MwsClient, Payload, RequestParameters};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let client = MwsClient::from_env().expect("Failed to create MWS client");

    println!("Checking Orders API status...");
    let result = client
        .send("GetServiceStatus", "/Orders/2013-09-01", &RequestParameters::new())
        .await;

    match result {
        Ok(Payload::Xml(root)) => {
            let status = root
                .find(&["GetServiceStatusResult", "Status"])
                .map(|node| node.text.as_str())
                .unwrap_or("unknown");
            println!("Orders API status: {}", status);
            println!(
                "{}",
                serde_json::to_string_pretty(&root.to_json()).unwrap()
            );
        }
        Ok(Payload::Raw(body)) => {
            println!("Unexpected non-XML response: {}", String::from_utf8_lossy(&body));
        }
        Err(e) => {
            eprintln!("Error checking service status: {}", e);
        }
    }
}
