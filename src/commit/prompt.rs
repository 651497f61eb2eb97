//! Prompt construction for commit message generation.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::commit::diff::ChangeSet;
use crate::config::Locale;

pub const FILES_TOKEN: &str = "${files}";
pub const DIFF_TOKEN: &str = "${diff}";

const PROMPT_EN: &str = "Generate a Git commit message for the following changes, formatted as <type>: <description>.\nFiles:\n${files}\nChanges:\n${diff}";

const PROMPT_ZH: &str =
    "根据以下Git变更生成Git提交信息，格式为 <type>: <description>。\n文件：${files}\n变更内容：${diff}";

const SYSTEM_EN: &str = "The subject line is <type>: <description>, at most 50 characters, imperative mood. \
After a blank line, write the body as a bulleted list, each point under 70 characters. \
Keep the points short and clear. Output only the commit message.";

const SYSTEM_ZH: &str = "标题行格式为 <type>: <description>，字数不要超过50个，description如果不是中文，则翻译成中文。\
两个换行后，输出正文内容，每个要点作为一个符号列表，不超过70个字。\
type使用英文，description和正文用中文，如果不是，则翻译成中文。要点简洁清晰。";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("Invalid regex"));

/// Default prompt template for `locale`.
pub fn default_prompt(locale: Locale) -> &'static str {
    match locale {
        Locale::En => PROMPT_EN,
        Locale::Zh => PROMPT_ZH,
    }
}

/// Default system instruction for `locale`.
pub fn default_system(locale: Locale) -> &'static str {
    match locale {
        Locale::En => SYSTEM_EN,
        Locale::Zh => SYSTEM_ZH,
    }
}

/// Substitute `${files}` and `${diff}` in `template`.
///
/// Files are listed one path per line. The diff is sanitized first.
pub fn render_prompt(template: &str, changes: &ChangeSet) -> String {
    let files = changes.paths().collect::<Vec<_>>().join("\n");

    let mut diff = sanitize_diff(&changes.diff_text);
    if changes.truncated {
        diff.push_str("\n[diff truncated]");
    }

    template
        .replace(FILES_TOKEN, &files)
        .replace(DIFF_TOKEN, &diff)
}

/// Strip ANSI escapes and control characters other than newline and tab.
pub fn sanitize_diff(text: &str) -> String {
    ANSI_ESCAPE
        .replace_all(text, "")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
