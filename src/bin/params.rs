use haze::DehazeConfig;
use serde_json::json;

fn main() {
    let params = DehazeConfig::default();
    let json = json!(params);
    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}
