use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Es,
    En,
    Pt,
}

impl Language {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "es" => Ok(Self::Es),
            "en" => Ok(Self::En),
            "pt" => Ok(Self::Pt),
            other => Err(AppError::validation(format!(
                "Unsupported language '{other}'. Use es, en or pt."
            ))),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::En => "en",
            Self::Pt => "pt",
        }
    }

    fn button_label(self) -> &'static str {
        match self {
            Self::Es => "Reservar",
            Self::En => "Book now",
            Self::Pt => "Reservar agora",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationSnippet {
    pub idioma: Language,
    pub element_id: String,
    pub script_url: String,
    pub html: String,
}

fn script_url(config: &AppConfig) -> AppResult<Url> {
    let base = Url::parse(&config.app_public_url).map_err(|error| {
        AppError::Internal(format!("APP_PUBLIC_URL is not a valid URL: {error}"))
    })?;
    base.join(&config.embed_script_path).map_err(|error| {
        AppError::Internal(format!("EMBED_SCRIPT_PATH cannot be resolved: {error}"))
    })
}

fn render(config: &AppConfig, lang: Language, element_id: String) -> AppResult<IntegrationSnippet> {
    let script_url = script_url(config)?.to_string();
    let html = format!(
        "<div id=\"{element_id}\" class=\"reservas-widget\" data-idioma=\"{lang}\">\n  \
         <button type=\"button\" class=\"reservas-widget__trigger\">{label}</button>\n\
         </div>\n\
         <script src=\"{script_url}\" data-idioma=\"{lang}\" async defer></script>",
        lang = lang.code(),
        label = lang.button_label(),
    );
    Ok(IntegrationSnippet {
        idioma: lang,
        element_id,
        script_url,
        html,
    })
}

/// Embed snippet for a single activity.
pub fn activity_snippet(
    config: &AppConfig,
    actividad_id: Uuid,
    lang: Language,
) -> AppResult<IntegrationSnippet> {
    render(config, lang, format!("actividad-{}-{actividad_id}", lang.code()))
}

/// Embed snippet listing every published activity of the agency.
pub fn menu_snippet(
    config: &AppConfig,
    agencia_id: Uuid,
    lang: Language,
) -> AppResult<IntegrationSnippet> {
    render(config, lang, format!("menu-{}-{agencia_id}", lang.code()))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{activity_snippet, menu_snippet, Language};
    use crate::config::AppConfig;

    #[test]
    fn activity_snippet_uses_language_and_id() {
        let id = Uuid::new_v4();
        let snippet = activity_snippet(&AppConfig::for_tests(), id, Language::En).unwrap();
        assert_eq!(snippet.element_id, format!("actividad-en-{id}"));
        assert_eq!(
            snippet.script_url,
            "https://reservas.example.com/integracion/reservas.js"
        );
        assert!(snippet.html.contains(&format!("id=\"actividad-en-{id}\"")));
        assert!(snippet.html.contains("Book now"));
    }

    #[test]
    fn menu_snippet_targets_the_agency() {
        let agency = Uuid::new_v4();
        let snippet = menu_snippet(&AppConfig::for_tests(), agency, Language::Pt).unwrap();
        assert_eq!(snippet.element_id, format!("menu-pt-{agency}"));
    }

    #[test]
    fn language_parsing() {
        assert_eq!(Language::parse("ES").unwrap(), Language::Es);
        assert_eq!(Language::parse("").unwrap(), Language::Es);
        assert!(Language::parse("fr").is_err());
    }
}
