//! Raw job results → candidate leads. Each acquisition channel has its own
//! field extraction: places items carry business contact data directly,
//! while profile results have to be parsed out of SERP titles following the
//! "Name - Role - Company | LinkedIn" convention.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use apexengine_common::{
    DecisionMaker, Lead, LeadAnalysis, LeadSource, LeadStatus, SearchIntent,
};
use apify_client::{OrganicResult, PlaceItem, SerpPage};

/// Company name assigned to listings the scraper could not identify.
pub const UNNAMED_COMPANY: &str = "Sin Nombre";

/// Company name shown for profile leads whose employer is unknown.
pub const PROFILE_COMPANY_FALLBACK: &str = "Ver perfil";

/// Convert one Google Maps place listing into a candidate lead.
pub fn place_to_lead(item: PlaceItem, intent: &SearchIntent) -> Lead {
    let company_name = item
        .title
        .clone()
        .or_else(|| item.name.clone())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNNAMED_COMPANY.to_string());

    let website = item
        .website
        .as_deref()
        .map(strip_scheme_and_slash)
        .filter(|s| !s.is_empty());

    let location = item.address.clone().or_else(|| item.full_address.clone());

    let email = item.primary_email().unwrap_or_default().to_string();
    let has_email = !email.is_empty();

    let summary = format!(
        "{} con {} reseñas ({}⭐)",
        item.category_name.as_deref().unwrap_or(&intent.industry),
        item.reviews_count.unwrap_or(0),
        item.total_score
            .map(|s| format!("{s:.1}"))
            .unwrap_or_else(|| "N/A".to_string()),
    );

    Lead {
        id: item
            .place_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("lead-{}", Uuid::new_v4())),
        source: LeadSource::Gmail,
        company_name,
        website,
        location,
        decision_maker: Some(DecisionMaker {
            name: String::new(),
            role: "Propietario".to_string(),
            email,
            phone: item.primary_phone().map(str::to_string),
            linkedin: None,
            facebook: item.facebook.clone().filter(|s| !s.is_empty()),
            instagram: item.instagram.clone().filter(|s| !s.is_empty()),
        }),
        analysis: LeadAnalysis {
            summary,
            ..Default::default()
        },
        message_a: None,
        high_value: false,
        status: if has_email {
            LeadStatus::Enriched
        } else {
            LeadStatus::Scraped
        },
    }
}

/// Flatten SERP result pages into their organic results.
pub fn flatten_serp_pages(pages: Vec<SerpPage>) -> Vec<OrganicResult> {
    pages.into_iter().flat_map(|p| p.organic_results).collect()
}

/// Convert one organic search result into a profile lead. Returns `None`
/// for anything that is not a LinkedIn profile URL.
pub fn organic_to_lead(result: &OrganicResult, intent: &SearchIntent) -> Option<Lead> {
    let url = result.url.as_deref()?;
    if !url.contains("linkedin.com/in/") {
        return None;
    }

    let title = result.title.as_deref().unwrap_or_default();
    let description = result.description.as_deref().unwrap_or_default();

    // "Juan García - CEO - Empresa | LinkedIn"
    let parts: Vec<&str> = title.split(" - ").collect();
    let name = parts
        .first()
        .map(|p| p.replace(" | LinkedIn", "").trim().to_string())
        .unwrap_or_default();
    let role = parts
        .get(1)
        .map(|p| p.trim().to_string())
        .filter(|r| !r.is_empty())
        .or_else(|| extract_role_from_text(title));
    let company = parts
        .get(2)
        .map(|p| p.replace(" | LinkedIn", "").trim().to_string())
        .filter(|c| !c.is_empty())
        .or_else(|| extract_company_from_text(description));

    let summary = if description.is_empty() {
        format!(
            "{} - {}",
            role.as_deref().unwrap_or("Profesional"),
            company.as_deref().unwrap_or(PROFILE_COMPANY_FALLBACK)
        )
    } else {
        description.chars().take(150).collect()
    };

    Some(Lead {
        id: format!("linkedin-{}", Uuid::new_v4()),
        source: LeadSource::Linkedin,
        company_name: company.unwrap_or_else(|| PROFILE_COMPANY_FALLBACK.to_string()),
        website: None,
        location: Some(intent.location.clone()),
        decision_maker: Some(DecisionMaker {
            name,
            role: role.unwrap_or_else(|| "Profesional".to_string()),
            email: String::new(),
            phone: None,
            linkedin: Some(url.to_string()),
            facebook: None,
            instagram: None,
        }),
        analysis: LeadAnalysis {
            summary,
            ..Default::default()
        },
        message_a: None,
        high_value: false,
        status: LeadStatus::Scraped,
    })
}

/// Keyword fallback for roles when the title does not follow the
/// three-part convention.
pub fn extract_role_from_text(text: &str) -> Option<String> {
    let lower = text.to_lowercase();

    let role = if lower.contains("co-founder") || lower.contains("cofundador") {
        "Co-Fundador"
    } else if lower.contains("ceo") {
        "CEO"
    } else if lower.contains("founder") || lower.contains("fundador") {
        "Fundador"
    } else if lower.contains("owner") || lower.contains("propietario") || lower.contains("dueño") {
        "Propietario"
    } else if lower.contains("director general") || lower.contains("managing director") {
        "Director General"
    } else if lower.contains("director") {
        "Director"
    } else if lower.contains("gerente") || lower.contains("manager") {
        "Gerente"
    } else if lower.contains("presidente") {
        "Presidente"
    } else {
        return None;
    };

    Some(role.to_string())
}

static COMPANY_AFTER_PREPOSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:en|at|@)\s+([A-ZÁÉÍÓÚÑ][A-Za-zÁÉÍÓÚÑáéíóúñ\s&]+)").unwrap());

/// Pull a company name out of free text ("CEO en Acme Inmobiliaria ...").
fn extract_company_from_text(text: &str) -> Option<String> {
    COMPANY_AFTER_PREPOSITION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Strip scheme and trailing slash only: the display form of a website,
/// not the dedup key (`normalize::normalize_url` keeps `www.` out too).
fn strip_scheme_and_slash(url: &str) -> String {
    url.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> SearchIntent {
        SearchIntent {
            search_query: "inmobiliarias".into(),
            industry: "Real Estate".into(),
            target_roles: vec!["CEO".into()],
            location: "Madrid".into(),
        }
    }

    #[test]
    fn place_maps_contact_fields() {
        let item: PlaceItem = serde_json::from_value(serde_json::json!({
            "placeId": "place-123",
            "title": "Inmobiliaria Sol",
            "website": "https://www.inmosol.es/",
            "address": "Calle Mayor 1, Madrid",
            "email": "hola@inmosol.es",
            "phone": "+34 600 111 222",
            "categoryName": "Agencia inmobiliaria",
            "reviewsCount": 42,
            "totalScore": 4.5
        }))
        .unwrap();

        let lead = place_to_lead(item, &intent());
        assert_eq!(lead.id, "place-123");
        assert_eq!(lead.company_name, "Inmobiliaria Sol");
        assert_eq!(lead.website.as_deref(), Some("www.inmosol.es"));
        assert_eq!(lead.email(), Some("hola@inmosol.es"));
        assert_eq!(lead.status, LeadStatus::Enriched);
        assert!(lead.analysis.summary.contains("42 reseñas"));
        assert!(lead.analysis.summary.contains("4.5"));
    }

    #[test]
    fn place_without_email_stays_scraped() {
        let item: PlaceItem = serde_json::from_value(serde_json::json!({
            "title": "Bar Paco"
        }))
        .unwrap();

        let lead = place_to_lead(item, &intent());
        assert_eq!(lead.status, LeadStatus::Scraped);
        assert!(lead.id.starts_with("lead-"));
        // Unknown category falls back to the interpreted industry.
        assert!(lead.analysis.summary.starts_with("Real Estate"));
    }

    #[test]
    fn unnamed_place_gets_placeholder() {
        let item = PlaceItem::default();
        let lead = place_to_lead(item, &intent());
        assert_eq!(lead.company_name, UNNAMED_COMPANY);
    }

    #[test]
    fn organic_result_parses_three_part_title() {
        let result = OrganicResult {
            url: Some("https://es.linkedin.com/in/juan-garcia".into()),
            title: Some("Juan García - CEO - Inmobiliaria Sol | LinkedIn".into()),
            description: Some("Juan García. CEO en Inmobiliaria Sol.".into()),
        };

        let lead = organic_to_lead(&result, &intent()).unwrap();
        assert_eq!(lead.company_name, "Inmobiliaria Sol");
        let dm = lead.decision_maker.unwrap();
        assert_eq!(dm.name, "Juan García");
        assert_eq!(dm.role, "CEO");
        assert_eq!(
            dm.linkedin.as_deref(),
            Some("https://es.linkedin.com/in/juan-garcia")
        );
    }

    #[test]
    fn organic_result_falls_back_to_keyword_role_and_snippet_company() {
        let result = OrganicResult {
            url: Some("https://linkedin.com/in/maria".into()),
            title: Some("María López | LinkedIn".into()),
            description: Some("Fundadora y propietaria en Gestora Norte desde 2015".into()),
        };

        let lead = organic_to_lead(&result, &intent()).unwrap();
        let dm = lead.decision_maker.unwrap();
        assert_eq!(dm.name, "María López");
        // The title carries no role keyword, so the generic role applies.
        assert_eq!(dm.role, "Profesional");
        assert_eq!(lead.company_name, "Gestora Norte desde");
    }

    #[test]
    fn non_profile_urls_are_skipped() {
        let result = OrganicResult {
            url: Some("https://linkedin.com/company/acme".into()),
            title: Some("Acme | LinkedIn".into()),
            description: None,
        };
        assert!(organic_to_lead(&result, &intent()).is_none());

        let no_url = OrganicResult::default();
        assert!(organic_to_lead(&no_url, &intent()).is_none());
    }

    #[test]
    fn role_keywords_cover_spanish_and_english() {
        assert_eq!(extract_role_from_text("CEO at Acme"), Some("CEO".into()));
        assert_eq!(
            extract_role_from_text("Co-Founder & CTO"),
            Some("Co-Fundador".into())
        );
        assert_eq!(
            extract_role_from_text("Dueño de taller"),
            Some("Propietario".into())
        );
        assert_eq!(
            extract_role_from_text("Managing Director de la firma"),
            Some("Director General".into())
        );
        assert_eq!(extract_role_from_text("analista junior"), None);
    }

    #[test]
    fn serp_pages_flatten_in_order() {
        let pages = vec![
            SerpPage {
                organic_results: vec![OrganicResult {
                    url: Some("a".into()),
                    ..Default::default()
                }],
            },
            SerpPage {
                organic_results: vec![OrganicResult {
                    url: Some("b".into()),
                    ..Default::default()
                }],
            },
        ];
        let flat = flatten_serp_pages(pages);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].url.as_deref(), Some("a"));
    }
}
