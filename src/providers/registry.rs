//! Company registry port (INPI RNE).
//!
//! Account creation looks the SIREN up to confirm the business is still
//! trading and to snapshot its name, legal form and postal address.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{check_status, read_json, transport_error};
use crate::error::AppError;
use crate::models::{account::AccountType, billing_address::CompanyAddress};

const INPI: &str = "inpi";

/// What the registry knows about a business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRecord {
    pub siren: String,
    pub name: String,
    pub is_active: bool,
    pub kind: AccountType,
    pub address: CompanyAddress,
}

#[async_trait]
pub trait CompanyRegistry: Send + Sync + 'static {
    /// # Errors
    ///
    /// `NotFound` when the registry has no record for `siren`.
    async fn fetch_company(&self, siren: &str) -> Result<CompanyRecord, AppError>;
}

pub struct InpiRegistry {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

impl InpiRegistry {
    pub fn new(client: reqwest::Client, base_url: String, username: String, password: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            token: Mutex::new(None),
        }
    }

    async fn login(&self) -> Result<String, AppError> {
        let response = self
            .client
            .post(format!("{}/api/sso/login", self.base_url))
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .map_err(|e| transport_error(INPI, e))?;
        let login: LoginResponse = read_json(INPI, check_status(INPI, response).await?).await?;
        Ok(login.token)
    }
}

#[async_trait]
impl CompanyRegistry for InpiRegistry {
    async fn fetch_company(&self, siren: &str) -> Result<CompanyRecord, AppError> {
        let url = format!("{}/api/companies/{siren}", self.base_url);

        // The session token expires silently; 401 and 429 both mean log in again.
        for attempt in 0..2 {
            let token = {
                let mut cached = self.token.lock().await;
                match cached.as_ref() {
                    Some(token) => token.clone(),
                    None => {
                        let token = self.login().await?;
                        *cached = Some(token.clone());
                        token
                    }
                }
            };

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| transport_error(INPI, e))?;

            let status = response.status();
            if attempt == 0
                && (status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS)
            {
                tracing::info!(%status, "inpi session refused, logging in again");
                *self.token.lock().await = None;
                continue;
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::NotFound("company"));
            }

            let body: Value = read_json(INPI, check_status(INPI, response).await?).await?;
            return parse_company(siren, &body);
        }

        Err(AppError::ProviderUnavailable {
            provider: INPI,
            detail: "session refused after re-login".to_string(),
        })
    }
}

/// Interpret an RNE company document.
pub(crate) fn parse_company(siren: &str, body: &Value) -> Result<CompanyRecord, AppError> {
    let content = body
        .pointer("/formality/content")
        .ok_or(AppError::NotFound("company"))?;

    let (kind, person) = if let Some(p) = content.get("personneMorale").filter(|v| !v.is_null()) {
        (AccountType::Company, p)
    } else if let Some(p) = content.get("personnePhysique").filter(|v| !v.is_null()) {
        (AccountType::Individual, p)
    } else {
        return Err(AppError::NotFound("company"));
    };

    let name = match kind {
        AccountType::Company => company_name(person),
        AccountType::Individual => individual_name(person),
    };

    let ceased = ["natureCessation", "evenementCessation", "detailCessationEntreprise"]
        .iter()
        .any(|key| content.get(*key).is_some_and(|v| !v.is_null()));

    Ok(CompanyRecord {
        siren: siren.to_string(),
        name,
        is_active: !ceased,
        kind,
        address: company_address(person).unwrap_or_default(),
    })
}

fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn company_name(person: &Value) -> String {
    let mut name = text(person, "/identite/entreprise/denomination")
        .unwrap_or_default()
        .to_string();
    if let Some(trade) = text(person, "/identite/entreprise/nomCommercial") {
        name.push_str(&format!(" ({trade})"));
    }
    if let Some(acronym) = text(person, "/identite/description/sigle") {
        name.push_str(&format!(" ({acronym})"));
    }
    name
}

fn individual_name(person: &Value) -> String {
    if let Some(trade) = text(person, "/identite/entreprise/nomCommercial") {
        return trade.to_string();
    }

    let description = "/identite/entrepreneur/descriptionPersonne";
    let first = person
        .pointer(&format!("{description}/prenoms/0"))
        .and_then(Value::as_str)
        .map(capitalize)
        .unwrap_or_default();
    let birth_name = text(person, &format!("{description}/nom")).map(capitalize);
    let used_name = text(person, &format!("{description}/nomUsage")).map(capitalize);

    let surname = match (used_name, birth_name) {
        (Some(used), Some(birth)) => format!("{used} ({birth})"),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => String::new(),
    };
    format!("{first} {surname}").trim().to_string()
}

fn capitalize(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn company_address(person: &Value) -> Option<CompanyAddress> {
    let candidates = ["/etablissementPrincipal/adresse", "/adresseEntreprise/adresse"];
    let raw = candidates
        .iter()
        .filter_map(|p| person.pointer(p))
        .find(|a| {
            ["codePostal", "commune", "voie"]
                .iter()
                .all(|key| text(a, &format!("/{key}")).is_some())
        })?;

    let upper = |key: &str| text(raw, &format!("/{key}")).map(str::to_uppercase);
    let street_type = upper("typeVoie").map(|code| street_type_label(&code));
    let street_number = upper("numVoie");
    let repetition_index = upper("indiceRepetition");
    let complement = upper("complementLocalisation");
    let special_distribution = upper("distributionSpeciale");

    // The registry often repeats the number and type inside `voie`.
    let mut street_label = upper("voie").unwrap_or_default();
    for part in [&street_number, &street_type, &repetition_index, &complement, &special_distribution]
        .into_iter()
        .flatten()
    {
        if street_label.contains(part.as_str()) {
            street_label = street_label.replacen(part.as_str(), "", 1).trim().to_string();
        }
    }

    let postal_code = upper("codePostal");
    let city = upper("commune");

    let number_part = [&street_number, &repetition_index]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let address = [
        complement.as_deref(),
        Some(number_part.as_str()),
        street_type.as_deref(),
        Some(street_label.as_str()),
        special_distribution.as_deref(),
        postal_code.as_deref(),
        city.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    Some(CompanyAddress {
        address: Some(address),
        complement,
        street_number,
        repetition_index,
        street_type,
        street_label: Some(street_label),
        special_distribution,
        postal_code,
        city,
        country: upper("pays"),
        country_code: text(raw, "/codePays").map(str::to_string),
    })
}

/// Expand the common RNE street-type codes.
fn street_type_label(code: &str) -> String {
    let label = match code {
        "ALL" => "ALLEE",
        "AV" => "AVENUE",
        "BD" => "BOULEVARD",
        "CHE" => "CHEMIN",
        "CRS" => "COURS",
        "IMP" => "IMPASSE",
        "PL" => "PLACE",
        "QUAI" => "QUAI",
        "R" | "RUE" => "RUE",
        "RTE" => "ROUTE",
        "SQ" => "SQUARE",
        "ZA" => "ZONE ARTISANALE",
        "ZI" => "ZONE INDUSTRIELLE",
        other => other,
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> Value {
        json!({
            "formality": {
                "content": {
                    "personneMorale": {
                        "identite": {
                            "entreprise": { "denomination": "ACME SAS", "nomCommercial": "Acme" },
                            "description": { "sigle": "ACM" }
                        },
                        "etablissementPrincipal": {
                            "adresse": {
                                "numVoie": "12",
                                "typeVoie": "RUE",
                                "voie": "12 rue de la Paix",
                                "codePostal": "75002",
                                "commune": "Paris",
                                "pays": "France",
                                "codePays": "FR"
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn parses_active_company() {
        let record = parse_company("732829320", &company()).expect("company");
        assert_eq!(record.kind, AccountType::Company);
        assert!(record.is_active);
        assert_eq!(record.name, "ACME SAS (Acme) (ACM)");
        assert_eq!(record.address.street_label.as_deref(), Some("DE LA PAIX"));
        assert_eq!(
            record.address.address.as_deref(),
            Some("12 RUE DE LA PAIX 75002 PARIS")
        );
        assert_eq!(record.address.country_code.as_deref(), Some("FR"));
    }

    #[test]
    fn ceased_business_is_inactive() {
        let mut body = company();
        body["formality"]["content"]["natureCessation"] = json!("DISSOLUTION");
        let record = parse_company("732829320", &body).expect("company");
        assert!(!record.is_active);
    }

    #[test]
    fn individual_name_from_birth_and_used_names() {
        let body = json!({
            "formality": { "content": { "personnePhysique": {
                "identite": { "entrepreneur": { "descriptionPersonne": {
                    "prenoms": ["JEAN", "PAUL"], "nom": "DUPONT", "nomUsage": "MARTIN"
                }}}
            }}}
        });
        let record = parse_company("123456789", &body).expect("individual");
        assert_eq!(record.kind, AccountType::Individual);
        assert_eq!(record.name, "Jean Martin (Dupont)");
        assert_eq!(record.address, CompanyAddress::default());
    }

    #[test]
    fn missing_person_is_not_found() {
        let body = json!({ "formality": { "content": {} } });
        assert!(matches!(
            parse_company("123456789", &body),
            Err(AppError::NotFound("company"))
        ));
    }
}
