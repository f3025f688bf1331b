use reqwest::Client;
use serde::Serialize;

use super::{CardExporter, ExportOutcome, ExportReport};
use crate::config::Mochi;
use crate::error::ServiceError;
use crate::store::Flashcard;

#[derive(Serialize)]
struct NewCard<'a> {
    content: String,
    #[serde(rename = "deck-id")]
    deck_id: &'a str,
}

pub struct MochiExporter {
    client: Client,
    cfg: Mochi,
}

impl MochiExporter {
    pub fn new(cfg: &Mochi) -> Self {
        MochiExporter {
            client: Client::new(),
            cfg: cfg.clone(),
        }
    }

    async fn create_card(&self, api_key: &str, card: &Flashcard) -> Result<(), ServiceError> {
        let body = NewCard {
            content: card.to_wire(),
            deck_id: &self.cfg.deck_id,
        };
        let response = self
            .client
            .post(&self.cfg.endpoint)
            .basic_auth(api_key, None::<&str>)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ServiceError::from_status(status.as_u16()))
        }
    }
}

impl CardExporter for MochiExporter {
    /// One request per card, in order. A rejected credential stops the run since every
    /// remaining card would be rejected the same way.
    async fn export(&self, cards: &[Flashcard]) -> Result<ExportReport, ServiceError> {
        if cards.is_empty() {
            return Err(ServiceError::EmptyInput("No cards to export!"));
        }
        let api_key = self
            .cfg
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ServiceError::MissingCredential("Mochi"))?;
        if self.cfg.deck_id.trim().is_empty() {
            return Err(ServiceError::NotConfigured("Mochi deck"));
        }

        let mut report = ExportReport::default();
        for (i, card) in cards.iter().enumerate() {
            let result = self.create_card(api_key, card).await;
            let stop = matches!(result, Err(ServiceError::InvalidCredential | ServiceError::AccessDenied));
            if let Err(e) = &result {
                tracing::warn!(card_id = %card.id, error = %e, "failed to export card");
            }
            report.outcomes.push(ExportOutcome {
                card_id: card.id.clone(),
                result,
            });
            if stop {
                report.skipped = cards.len() - i - 1;
                break;
            }
        }

        tracing::info!(
            exported = report.exported(),
            failed = report.failed(),
            skipped = report.skipped,
            "mochi export finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn card(id: &str, front: &str) -> Flashcard {
        Flashcard {
            id: id.to_string(),
            front: front.to_string(),
            back: "back".to_string(),
        }
    }

    fn cfg(endpoint: String) -> Mochi {
        Mochi {
            endpoint,
            api_key: Some("key".to_string()),
            deck_id: "deck1".to_string(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/cards", addr)
    }

    #[tokio::test]
    async fn test_posts_each_card_in_wire_form() {
        let seen = Arc::new(Mutex::new(Vec::<(String, Value)>::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/api/cards",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    let auth = headers["authorization"].to_str().unwrap_or_default().to_string();
                    recorder.lock().unwrap().push((auth, body));
                    StatusCode::OK
                }
            }),
        );
        let exporter = MochiExporter::new(&cfg(serve(app).await));

        let report = exporter.export(&[card("a", "Q1"), card("b", "Q2")]).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.exported(), 2);
        let seen = seen.lock().unwrap();
        // base64("key:")
        assert_eq!(seen[0].0, "Basic a2V5Og==");
        assert_eq!(seen[0].1["content"], "Q1---back");
        assert_eq!(seen[1].1["deck-id"], "deck1");
    }

    #[tokio::test]
    async fn test_unauthorized_stops_the_run() {
        let app = Router::new().route("/api/cards", post(|| async { StatusCode::UNAUTHORIZED }));
        let exporter = MochiExporter::new(&cfg(serve(app).await));

        let report = exporter.export(&[card("a", "Q1"), card("b", "Q2"), card("c", "Q3")]).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.skipped, 2);
        assert!(report.needs_credential());
    }

    #[tokio::test]
    async fn test_rate_limit_is_per_card() {
        let app = Router::new().route("/api/cards", post(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let exporter = MochiExporter::new(&cfg(serve(app).await));

        let report = exporter.export(&[card("a", "Q1"), card("b", "Q2")]).await.unwrap();

        assert_eq!(report.failed(), 2);
        assert_eq!(
            report.first_error().unwrap().to_string(),
            "Too many requests. Please try again later"
        );
    }

    #[tokio::test]
    async fn test_preconditions() {
        let mut no_key = cfg("http://127.0.0.1:9".to_string());
        no_key.api_key = None;

        let empty = MochiExporter::new(&no_key).export(&[]).await.unwrap_err();
        assert_eq!(empty.to_string(), "No cards to export!");

        let missing = MochiExporter::new(&no_key).export(&[card("a", "Q")]).await.unwrap_err();
        assert_eq!(missing.to_string(), "Please enter your Mochi API key");

        let mut no_deck = cfg("http://127.0.0.1:9".to_string());
        no_deck.deck_id = String::new();
        let unconfigured = MochiExporter::new(&no_deck).export(&[card("a", "Q")]).await.unwrap_err();
        assert!(matches!(unconfigured, ServiceError::NotConfigured("Mochi deck")));
        assert_eq!(unconfigured.to_string(), "Mochi deck is not configured");
    }
}
