//! 语言包
//!
//! 语言包为CrowdIn导出的嵌套JSON，加载时展开为以点分隔的消息ID：
//!
//! ```json
//! {"gdpr": {"completed": {"title": "Data Request Completed"}}}
//! ```
//!
//! 展开后为 `gdpr.completed.title`。空字符串视为未翻译。

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Write as _};
use std::path::Path;
use std::sync::Arc;

use erasure_core::{ErasureError, ErasureResult};
use serde_json::Value;
use tracing::{debug, warn};

pub const ENGLISH_LONG_CODE: &str = "en-GB";
pub const ENGLISH_SHORT_CODE: &str = "en";

/// 单个语言的消息表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub short_code: String,
    pub long_code: String,
    messages: HashMap<String, String>,
}

impl Locale {
    pub fn new(long_code: impl Into<String>, messages: HashMap<String, String>) -> Self {
        let long_code = long_code.into();
        Self {
            short_code: short_code(&long_code).to_string(),
            long_code,
            messages,
        }
    }

    /// 从CrowdIn格式的JSON文本解析
    pub fn parse(long_code: impl Into<String>, raw: &str) -> ErasureResult<Self> {
        let document: Value = serde_json::from_str(raw)?;
        let Value::Object(root) = document else {
            return Err(ErasureError::Configuration(
                "locale file must contain a JSON object".to_string(),
            ));
        };

        let mut messages = HashMap::new();
        flatten("", &root, &mut messages);
        Ok(Self::new(long_code, messages))
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.messages.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn short_code(long_code: &str) -> &str {
    long_code.split('-').next().unwrap_or(long_code)
}

fn flatten(prefix: &str, object: &serde_json::Map<String, Value>, out: &mut HashMap<String, String>) {
    for (key, value) in object {
        let path = match (prefix.is_empty(), key.is_empty()) {
            (_, true) => prefix.to_string(),
            (true, false) => key.clone(),
            (false, false) => format!("{prefix}.{key}"),
        };

        match value {
            Value::String(text) if !text.is_empty() => {
                out.insert(path, text.clone());
            }
            Value::Object(nested) => flatten(&path, nested, out),
            _ => {}
        }
    }
}

/// 全部语言包，加载后只读
#[derive(Debug, Clone)]
pub struct LocaleCatalog {
    english: Arc<Locale>,
    locales: HashMap<String, Arc<Locale>>,
}

impl LocaleCatalog {
    /// 只包含英文的语言包集合
    pub fn with_english(english: Locale) -> Self {
        let english = Arc::new(english);
        let mut locales = HashMap::new();
        locales.insert(ENGLISH_LONG_CODE.to_string(), Arc::clone(&english));
        locales.insert(ENGLISH_SHORT_CODE.to_string(), Arc::clone(&english));
        Self { english, locales }
    }

    /// 添加一个语言，同时以长代码和短代码索引
    pub fn insert(&mut self, locale: Locale) {
        let locale = Arc::new(locale);
        self.locales
            .insert(locale.short_code.clone(), Arc::clone(&locale));
        self.locales.insert(locale.long_code.clone(), locale);
    }

    /// 加载目录下的全部语言包
    ///
    /// `en-GB.json` 必须存在；其它语言加载失败只记录警告。
    pub fn load(dir: impl AsRef<Path>) -> ErasureResult<Self> {
        let dir = dir.as_ref();
        let english_path = dir.join(format!("{ENGLISH_LONG_CODE}.json"));
        let raw = std::fs::read_to_string(&english_path).map_err(|e| {
            ErasureError::Configuration(format!(
                "failed to load English locale {}: {e}",
                english_path.display()
            ))
        })?;
        let mut catalog = Self::with_english(Locale::parse(ENGLISH_LONG_CODE, &raw)?);

        let entries = std::fs::read_dir(dir).map_err(|e| {
            ErasureError::Configuration(format!("failed to read locale directory: {e}"))
        })?;

        let mut files = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(code) = path.file_stem().and_then(|stem| stem.to_str()) {
                if code != ENGLISH_LONG_CODE {
                    files.insert(code.to_string(), path.clone());
                }
            }
        }

        for (code, path) in files {
            let locale = std::fs::read_to_string(&path)
                .map_err(|e| ErasureError::Configuration(e.to_string()))
                .and_then(|raw| Locale::parse(code.as_str(), &raw));
            match locale {
                Ok(locale) => {
                    debug!(locale = %code, messages = locale.len(), "Loaded locale");
                    catalog.insert(locale);
                }
                Err(e) => warn!(locale = %code, "Failed to load locale: {}", e),
            }
        }

        Ok(catalog)
    }

    pub fn english(&self) -> &Locale {
        &self.english
    }

    /// 按语言代码查找，依次尝试完整代码、短代码，最后回退到英文
    pub fn locale(&self, code: Option<&str>) -> &Locale {
        let Some(code) = code.filter(|code| !code.is_empty()) else {
            return &self.english;
        };

        self.locales
            .get(code)
            .or_else(|| self.locales.get(short_code(code)))
            .map(Arc::as_ref)
            .unwrap_or(self.english.as_ref())
    }

    /// 取得消息并代入参数，缺失时回退到英文
    pub fn message(&self, locale: &Locale, id: &str, args: &[&dyn Display]) -> String {
        match locale.get(id).or_else(|| self.english.get(id)) {
            Some(template) => format_message(template, args),
            None => format!("error: translation for `{id}` is missing"),
        }
    }
}

/// 按位置代入 `%s`、`%d`、`%v`，`%%` 输出百分号
///
/// 参数不足时占位符原样保留，多余的参数忽略。
pub fn format_message(template: &str, args: &[&dyn Display]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                output.push('%');
            }
            Some(verb @ ('s' | 'd' | 'v')) => {
                chars.next();
                match args.next() {
                    Some(arg) => {
                        let _ = write!(output, "{arg}");
                    }
                    None => {
                        output.push('%');
                        output.push(verb);
                    }
                }
            }
            _ => output.push('%'),
        }
    }

    output
}
