//! Localized user-visible strings.
//!
//! Built-in tables cover English and French; configuration overrides win,
//! then the selected language, then English, then the key itself.

use std::collections::HashMap;

const EN: &[(&str, &str)] = &[
    ("error_intent_low_confidence", "Sorry, I did not understand you well"),
    ("error_intent_unknown", "Sorry, nobody can handle that request"),
    ("error_handler_no_entry", "Sorry, this action is not available"),
    ("error_handler_exec", "Sorry, something went wrong while handling your request"),
    ("error_nlu", "Sorry, I could not analyse your request"),
    ("no_handler", "I don't know how to do that yet"),
    ("i_can_do_many", "I can do many things, for example"),
    ("core_intent_no_handler", "I don't know this plugin"),
    ("core_no_capability", "I can't do anything yet"),
    ("error_invalid_json", "Error: invalid JSON"),
    ("error_no_type", "Error: no type in input JSON"),
    ("error_unknown_type", "Error: unknown input type {type}"),
    ("error_unknown_command", "Error: unknown command {command}"),
    ("error_not_logged_in", "Error: please log in first"),
    ("error_missing_field", "Error: missing field {field}"),
];

const FR: &[(&str, &str)] = &[
    ("error_intent_low_confidence", "Désolé, je ne vous ai pas bien compris"),
    ("error_intent_unknown", "Désolé, personne ne sait traiter cette demande"),
    ("error_handler_no_entry", "Désolé, cette action n'est pas disponible"),
    ("error_handler_exec", "Désolé, une erreur est survenue pendant le traitement"),
    ("error_nlu", "Désolé, je n'ai pas pu analyser votre demande"),
    ("no_handler", "Je ne sais pas encore faire ça"),
    ("i_can_do_many", "Je sais faire beaucoup de choses, par exemple"),
    ("core_intent_no_handler", "Je ne connais pas ce plugin"),
    ("core_no_capability", "Je ne sais encore rien faire"),
    ("error_invalid_json", "Erreur : JSON invalide"),
    ("error_no_type", "Erreur : pas de type dans le JSON"),
    ("error_unknown_type", "Erreur : type d'entrée inconnu {type}"),
    ("error_unknown_command", "Erreur : commande inconnue {command}"),
    ("error_not_logged_in", "Erreur : veuillez vous identifier"),
    ("error_missing_field", "Erreur : champ manquant {field}"),
];

fn builtin(lang: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match lang {
        "en" => Some(EN),
        "fr" => Some(FR),
        _ => None,
    }
}

/// Translation catalog for one server language.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    lang: String,
    entries: HashMap<String, String>,
}

impl Catalog {
    /// Build the catalog for `lang` (short form, e.g. "fr"), layering `overrides` on top.
    pub fn new(lang: impl Into<String>, overrides: &HashMap<String, String>) -> Self {
        let lang = lang.into();
        let mut entries: HashMap<String, String> = EN
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(table) = builtin(&lang) {
            entries.extend(table.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        } else if lang != "en" {
            tracing::warn!(lang = %lang, "No built-in translations, falling back to English");
        }
        entries.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { lang, entries }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Translate a key; unknown keys come back unchanged.
    pub fn tr(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Translate and substitute `{name}` placeholders.
    pub fn tr_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.tr(key);
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_selection() {
        let fr = Catalog::new("fr", &HashMap::new());
        assert_eq!(fr.tr("no_handler"), "Je ne sais pas encore faire ça");
        let en = Catalog::new("en", &HashMap::new());
        assert_eq!(en.tr("no_handler"), "I don't know how to do that yet");
    }

    #[test]
    fn test_unknown_language_falls_back_to_english() {
        let de = Catalog::new("de", &HashMap::new());
        assert_eq!(de.tr("no_handler"), "I don't know how to do that yet");
        assert_eq!(de.tr("not_a_key"), "not_a_key");
    }

    #[test]
    fn test_overrides_win() {
        let overrides = HashMap::from([("no_handler".to_string(), "Nope".to_string())]);
        let fr = Catalog::new("fr", &overrides);
        assert_eq!(fr.tr("no_handler"), "Nope");
    }

    #[test]
    fn test_placeholders() {
        let en = Catalog::new("en", &HashMap::new());
        assert_eq!(
            en.tr_with("error_unknown_command", &[("command", "reboot")]),
            "Error: unknown command reboot"
        );
    }
}
