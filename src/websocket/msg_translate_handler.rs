use tracing::info;

use crate::models::{OutboundEvent, SyncError, TranslateContentMessage, TranslationResultMessage};
use crate::ws::connection::Connection;
use super::router::{EventRouter, Outcome};

const MAX_TEXT_CHARS: usize = 5000;
const MAX_LANG_CHARS: usize = 10;

fn validate_target_lang(lang: &str) -> Result<String, SyncError> {
    let lang = lang.trim();
    let valid = !lang.is_empty()
        && lang.chars().count() <= MAX_LANG_CHARS
        && lang.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    if !valid {
        return Err(SyncError::Validation(format!("Invalid target language '{}'", lang)));
    }
    Ok(lang.to_lowercase())
}

/// Handle translate-content. The result goes back to the requester only.
pub async fn handle_translate_content(
    router: &EventRouter,
    conn: &Connection,
    msg: TranslateContentMessage,
) -> Result<Outcome, SyncError> {
    if msg.text.trim().is_empty() {
        return Err(SyncError::Validation("Text to translate cannot be empty".to_string()));
    }
    if msg.text.chars().count() > MAX_TEXT_CHARS {
        return Err(SyncError::Validation(format!(
            "Text to translate cannot exceed {} characters",
            MAX_TEXT_CHARS
        )));
    }
    let target_lang = validate_target_lang(&msg.target_lang)?;

    let translation = router.provider.translate(&msg.text, &target_lang).await?;
    info!(
        user_id = %conn.user().id,
        path_id = %msg.path_id,
        source = %translation.source_lang,
        target = %translation.target_lang,
        "Content translated"
    );

    Ok(Outcome::reply(OutboundEvent::TranslationResult(TranslationResultMessage {
        original_text: msg.text,
        translated_text: translation.translated_text,
        source_lang: translation.source_lang,
        target_lang: translation.target_lang,
        context: msg.context,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_language_validation() {
        assert_eq!(validate_target_lang(" ES ").unwrap(), "es");
        assert_eq!(validate_target_lang("pt-BR").unwrap(), "pt-br");
        assert!(validate_target_lang("").is_err());
        assert!(validate_target_lang("en; drop").is_err());
        assert!(validate_target_lang("abcdefghijk").is_err());
    }
}
