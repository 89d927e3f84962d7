use std::time::Duration;
use itertools::Itertools;
use log::{info, warn};
use reqwest::blocking::Client;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use crate::errors::GeneMappingError;

pub const MYGENE_QUERY_URL: &str = "https://mygene.info/v3/query";
const QUERY_BATCH_SIZE: usize = 1000;

/// Resolves gene symbols (or aliases) to canonical gene symbols.
pub trait GeneMapper {
    /// Only resolved symbols appear in the returned map.
    fn map_symbols(&self, symbols: &[String]) -> Result<FxHashMap<String, String>, GeneMappingError>;
}

#[derive(Debug, Deserialize)]
struct QueryHit {
    query: String,
    symbol: Option<String>,
    #[serde(default)]
    notfound: bool,
}

/// Batch client for the MyGene.info query service.
pub struct MyGeneClient {
    client: Client,
    endpoint: String,
    species: String,
}

impl MyGeneClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::from_client(Client::builder().timeout(timeout).build()?))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            endpoint: MYGENE_QUERY_URL.to_string(),
            species: "human".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

impl GeneMapper for MyGeneClient {
    fn map_symbols(&self, symbols: &[String]) -> Result<FxHashMap<String, String>, GeneMappingError> {
        let mut mapping = FxHashMap::default();

        for batch in &symbols.iter().chunks(QUERY_BATCH_SIZE) {
            let query = batch.map(String::as_str).join(",");
            let response = self
                .client
                .post(&self.endpoint)
                .form(&[
                    ("q", query.as_str()),
                    ("scopes", "symbol,alias"),
                    ("fields", "symbol,entrezgene"),
                    ("species", self.species.as_str()),
                ])
                .send()?;

            if !response.status().is_success() {
                return Err(GeneMappingError::Status(response.status().as_u16()));
            }

            let hits: Vec<QueryHit> = response.json()?;
            for hit in hits {
                if hit.notfound {
                    continue;
                }
                if let Some(symbol) = hit.symbol {
                    mapping.entry(hit.query).or_insert(symbol);
                }
            }
        }

        Ok(mapping)
    }
}

/// Canonical ids for every input symbol. Unresolved symbols keep their own
/// (upper-cased) symbol and are listed in `unresolved`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingOutcome {
    pub canonical: Vec<(String, String)>,
    pub unresolved: Vec<String>,
}

pub fn map_with_fallback<M: GeneMapper + ?Sized>(mapper: &M, symbols: &[String]) -> MappingOutcome {
    let mapping = match mapper.map_symbols(symbols) {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!("Gene mapping failed ({}); continuing with input symbols", e);
            return MappingOutcome {
                canonical: symbols
                    .iter()
                    .map(|symbol| (symbol.clone(), symbol.to_uppercase()))
                    .collect(),
                unresolved: Vec::new(),
            };
        }
    };

    let mut outcome = MappingOutcome::default();
    for symbol in symbols {
        match mapping.get(symbol) {
            Some(canonical) => outcome
                .canonical
                .push((symbol.clone(), canonical.to_uppercase())),
            None => {
                outcome.canonical.push((symbol.clone(), symbol.to_uppercase()));
                outcome.unresolved.push(symbol.clone());
            }
        }
    }

    info!(
        "Input genes: {}, unmapped (up to 20): {:?}",
        symbols.len(),
        outcome.unresolved.iter().take(20).collect::<Vec<_>>()
    );
    outcome
}

/// Fixed symbol table, for offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticGeneMapper(pub FxHashMap<String, String>);

impl GeneMapper for StaticGeneMapper {
    fn map_symbols(&self, symbols: &[String]) -> Result<FxHashMap<String, String>, GeneMappingError> {
        Ok(symbols
            .iter()
            .filter_map(|symbol| self.0.get(symbol).map(|canonical| (symbol.clone(), canonical.clone())))
            .collect())
    }
}

/// Identity mapping: every symbol is its own canonical id.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl GeneMapper for IdentityMapper {
    fn map_symbols(&self, symbols: &[String]) -> Result<FxHashMap<String, String>, GeneMappingError> {
        Ok(symbols.iter().map(|s| (s.clone(), s.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(read) => read,
            };
            buffer.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Answers one request with a canned response and hands the raw request back.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let (sender, requests) = mpsc::channel();

        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = sender.send(read_request(&mut stream));
                let response = format!(
                    "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (format!("http://{}/v3/query", address), requests)
    }

    fn client(endpoint: &str) -> MyGeneClient {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap();
        MyGeneClient::from_client(client).with_endpoint(endpoint)
    }

    #[test]
    fn symbols_are_posted_as_one_form_query() {
        let (endpoint, requests) = serve_once(
            "HTTP/1.1 200 OK",
            r#"[
                {"query": "p53", "_id": "7157", "symbol": "TP53"},
                {"query": "p53", "_id": "100128", "symbol": "TP53P1"},
                {"query": "akt1", "_id": "207", "symbol": "AKT1"},
                {"query": "orf9x", "notfound": true}
            ]"#,
        );

        let mapping = client(&endpoint)
            .map_symbols(&symbols(&["p53", "akt1", "orf9x"]))
            .unwrap();

        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["p53"], "TP53");
        assert_eq!(mapping["akt1"], "AKT1");

        let request = requests.recv().unwrap();
        assert!(request.starts_with("POST /v3/query "));
        assert!(request.to_ascii_lowercase().contains("content-type: application/x-www-form-urlencoded"));
        assert!(request.contains("q=p53%2Cakt1%2Corf9x"));
        assert!(request.contains("scopes=symbol%2Calias"));
        assert!(request.contains("species=human"));
    }

    #[test]
    fn error_status_is_reported() {
        let (endpoint, _requests) = serve_once("HTTP/1.1 503 Service Unavailable", "{}");
        let result = client(&endpoint).map_symbols(&symbols(&["p53"]));
        assert!(matches!(result, Err(GeneMappingError::Status(503))));
    }

    #[test]
    fn unreachable_service_falls_back_to_input_symbols() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let outcome = map_with_fallback(
            &client(&format!("http://{}/v3/query", address)),
            &symbols(&["p53"]),
        );
        assert_eq!(outcome.canonical, vec![("p53".to_string(), "P53".to_string())]);
    }

    struct FailingMapper;

    impl GeneMapper for FailingMapper {
        fn map_symbols(&self, _: &[String]) -> Result<FxHashMap<String, String>, GeneMappingError> {
            Err(GeneMappingError::Status(503))
        }
    }

    fn symbols(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unresolved_symbols_fall_back_to_themselves() {
        let mut table = FxHashMap::default();
        table.insert("p53".to_string(), "TP53".to_string());
        let outcome = map_with_fallback(&StaticGeneMapper(table), &symbols(&["p53", "orf9x"]));

        assert_eq!(
            outcome.canonical,
            vec![
                ("p53".to_string(), "TP53".to_string()),
                ("orf9x".to_string(), "ORF9X".to_string()),
            ]
        );
        assert_eq!(outcome.unresolved, vec!["orf9x"]);
    }

    #[test]
    fn service_failure_keeps_every_symbol() {
        let outcome = map_with_fallback(&FailingMapper, &symbols(&["akt1", "TNF"]));
        assert_eq!(outcome.canonical.len(), 2);
        assert_eq!(outcome.canonical[0].1, "AKT1");
        assert!(outcome.unresolved.is_empty());
    }

    #[test]
    fn service_hits_deserialize() {
        let body = r#"[
            {"query": "p53", "_id": "7157", "symbol": "TP53", "entrezgene": 7157},
            {"query": "nope", "notfound": true}
        ]"#;
        let hits: Vec<QueryHit> = serde_json::from_str(body).unwrap();
        assert_eq!(hits[0].symbol.as_deref(), Some("TP53"));
        assert!(hits[1].notfound);
    }
}
