use mws_client::{MwsClient, RequestParameters};

const INVENTORY_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<AmazonEnvelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="amzn-envelope.xsd">
  <Header>
    <DocumentVersion>1.01</DocumentVersion>
    <MerchantIdentifier>MERCHANT</MerchantIdentifier>
  </Header>
  <MessageType>Inventory</MessageType>
  <Message>
    <MessageID>1</MessageID>
    <OperationType>Update</OperationType>
    <Inventory>
      <SKU>EXAMPLE-SKU</SKU>
      <Quantity>10</Quantity>
    </Inventory>
  </Message>
</AmazonEnvelope>"#;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let client = MwsClient::from_env().expect("Failed to create MWS client");

    let params: RequestParameters = [
        ("FeedType", "_POST_INVENTORY_AVAILABILITY_DATA_"),
        ("xml", INVENTORY_FEED),
    ]
    .into_iter()
    .collect();

    // The request is signed locally before anything is sent.
    let signed = client
        .build_request("SubmitFeed", "/", &params)
        .expect("Failed to build request");
    println!("Content-MD5: {}", signed.parameters.get("ContentMD5Value").unwrap_or_default());

    match client.send("SubmitFeed", "/", &params).await {
        Ok(payload) => match payload.as_xml() {
            Some(root) => {
                let id = root
                    .find(&["SubmitFeedResult", "FeedSubmissionInfo", "FeedSubmissionId"])
                    .map(|node| node.text.as_str())
                    .unwrap_or("unknown");
                println!("Feed submitted, id {}", id);
            }
            None => println!("Feed submitted, non-XML response"),
        },
        Err(e) => match e.as_service_error() {
            Some(service) => eprintln!(
                "Service rejected feed: {} (code {:?}, request id {:?})",
                service.message(),
                service.code(),
                service.request_id()
            ),
            None => eprintln!("Error submitting feed: {}", e),
        },
    }
}
