use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

impl Source {
    pub fn new(title: &str, url: &str) -> Self {
        Self { title: title.to_string(), url: url.to_string() }
    }
}

/// Pages spread over several sites so no single host sees many requests.
pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new("Section 80C Deductions", "https://www.indiafilings.com/learn/section-80c-deduction/"),
        Source::new("Section 80D Medical", "https://www.bankbazaar.com/tax/section-80d.html"),
        Source::new("HRA Exemptions", "https://www.bankbazaar.com/tax/house-rent-allowance.html"),
        Source::new(
            "Home Loan Tax Benefits",
            "https://www.bajajfinserv.in/tax-deduction-on-home-loan-interest-under-section-24",
        ),
        Source::new("Income Tax India (Wiki Backup)", "https://en.wikipedia.org/wiki/Income_tax_in_India"),
    ]
}

/// Loads a JSON array of `{ "title": ..., "url": ... }` objects.
pub fn load_sources(path: &Path) -> Result<Vec<Source>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let sources: Vec<Source> = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("Invalid sources file {}: {}", path.display(), e)))?;
    validate_sources(&sources)?;
    Ok(sources)
}

pub fn validate_sources(sources: &[Source]) -> Result<(), AppError> {
    for source in sources {
        let url = Url::parse(&source.url)
            .map_err(|e| AppError::Config(format!("Invalid URL for {}: {}", source.title, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "Unsupported scheme {} for {}",
                url.scheme(),
                source.title
            )));
        }
    }
    Ok(())
}
