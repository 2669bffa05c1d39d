// i18n.rs — runtime UI strings
//
// - Strings live in either:
//   A) assets/i18n/<lang>.json
//   B) assets/i18n.json (single file, format: { "<lang>": { "key": "value" } })
// - Load order: selected lang -> built-in English -> the key itself
// - Lookup: tr("key") / tr_with("key", &[("name", ..)]) with {name} placeholders

use once_cell::sync::{Lazy, OnceCell};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

pub const FALLBACK_LANG: &str = "en";

/// Languages offered in the UI: (code, native name).
pub const LANGUAGES: [(&str, &str); 2] = [("en", "English"), ("zh-Hans", "简体中文")];

static BUILTIN_EN: Lazy<HashMap<String, String>> =
    Lazy::new(|| serde_json::from_str(include_str!("../assets/i18n/en.json")).unwrap_or_default());

#[derive(Debug, Clone)]
pub struct I18n {
    pub lang: String,
    map: HashMap<String, String>,
}

impl I18n {
    pub fn new(lang: impl Into<String>, map: HashMap<String, String>) -> Self {
        Self { lang: lang.into(), map }
    }

    pub fn get(&self, key: &str) -> String {
        self.map
            .get(key)
            .or_else(|| BUILTIN_EN.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn load_json_map(path: &Path) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn load_multi_lang_json(path: &Path, lang: &str) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut all: HashMap<String, HashMap<String, String>> = serde_json::from_str(&text).ok()?;
    all.remove(lang)
}

/// `<exe_dir>/assets/<rel>` first, then `./assets/<rel>`.
fn find_asset(rel: &Path) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    exe_dir
        .into_iter()
        .chain(std::iter::once(PathBuf::new()))
        .map(|base| base.join("assets").join(rel))
        .find(|p| p.exists())
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    let per_lang = find_asset(&Path::new("i18n").join(format!("{lang}.json"))).and_then(|p| load_json_map(&p));
    if let Some(m) = per_lang {
        return m;
    }

    let multi = find_asset(Path::new("i18n.json")).and_then(|p| load_multi_lang_json(&p, lang));
    if let Some(m) = multi {
        return m;
    }

    if lang != FALLBACK_LANG {
        log::warn!("no strings for language {lang}, using built-in English");
    }
    HashMap::new()
}

/// Initialize global i18n. Later calls replace the current language.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let i = I18n::new(lang.clone(), load_lang(&lang));

    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else if I18N.set(RwLock::new(i)).is_err() {
        log::warn!("i18n initialised concurrently; keeping first table");
    }
}

/// Localized text by key; the key itself if no table has it.
pub fn tr(key: &str) -> String {
    match I18N.get().and_then(|l| l.read().ok()) {
        Some(i) => i.get(key),
        None => BUILTIN_EN.get(key).cloned().unwrap_or_else(|| key.to_string()),
    }
}

/// Localized text with `{name}` placeholders substituted.
/// Any placeholder not provided is kept as-is.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    substitute(tr(key), args)
}

fn substitute(mut s: String, args: &[(&str, String)]) -> String {
    for (k, v) in args {
        s = s.replace(&format!("{{{k}}}"), v);
    }
    s
}
