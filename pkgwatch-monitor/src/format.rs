//! Display formatting for snapshot fields
//!
//! Every function here is pure: raw record fields in, escaped text or HTML
//! markup out. Anything that came from the snapshot is escaped before it is
//! embedded in markup.

use pkgwatch_common::{PageKind, ServerStyle};
use serde_json::Value;

use crate::page::PageContext;

const PORTS_BROWSER_URL: &str = "https://www.freshports.org";

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn format_pkgname(pkgname: &str) -> String {
    escape_html(pkgname)
}

pub fn format_jail_name(jailname: &str) -> String {
    escape_html(jailname)
}

pub fn format_set_name(setname: &str) -> String {
    escape_html(setname)
}

pub fn format_pt_name(ptname: &str) -> String {
    escape_html(ptname)
}

/// `ptname` joined with the set name, if any: `default-py311`
pub fn format_port_set(ptname: &str, setname: &str) -> String {
    if setname.is_empty() {
        escape_html(ptname)
    } else {
        escape_html(&format!("{}-{}", ptname, setname))
    }
}

/// Link an origin (`category/port`) to the ports browser.
pub fn format_origin(origin: Option<&str>, flavor: Option<&str>) -> String {
    let Some(origin) = origin.filter(|o| !o.is_empty()) else {
        return String::new();
    };

    let mut parts = origin.splitn(2, '/');
    let category = parts.next().unwrap_or_default();
    let port = parts.next().unwrap_or_default();
    let flavor = flavor
        .filter(|f| !f.is_empty())
        .map(|f| format!("@{}", escape_html(f)))
        .unwrap_or_default();

    format!(
        r#"<a target="_new" title="freshports for {o}" href="{url}/{c}/{p}/"><span class="glyphicon glyphicon-tasks"></span>{o}{f}</a>"#,
        o = escape_html(origin),
        url = PORTS_BROWSER_URL,
        c = escape_html(category),
        p = escape_html(port),
        f = flavor,
    )
}

/// `HH:MM:SS`, hours not capped at 24
pub fn format_duration(duration: Option<i64>) -> String {
    let Some(duration) = duration else {
        return String::new();
    };
    let duration = duration.max(0);
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Duration between two producer timestamps.
///
/// With no `end` the start value is itself treated as a duration. Clock skew
/// never produces a negative result.
pub fn format_start_to_end(start: Option<i64>, end: Option<i64>) -> String {
    let Some(start) = start.filter(|s| *s != 0) else {
        return String::new();
    };
    let duration = match end {
        Some(end) => end - start,
        None => start,
    };
    format_duration(Some(duration.max(0)))
}

/// Build summaries carry `elapsed` either as seconds or preformatted text.
pub fn format_elapsed_value(elapsed: Option<&Value>) -> String {
    match elapsed {
        Some(Value::Number(n)) => format_duration(n.as_i64()),
        Some(Value::String(s)) => escape_html(s),
        _ => String::new(),
    }
}

/// Reduce a colon-delimited status to its displayed fields.
///
/// `stopped` states keep up to three fields (`stopped:reason:detail`),
/// everything else keeps two; a bare state gains a trailing `:`.
pub fn translate_status(status: Option<&str>) -> String {
    let Some(status) = status else {
        return String::new();
    };
    let fields: Vec<&str> = status.split(':').collect();
    let keep = if fields[0] == "stopped" { 3 } else { 2 };
    if fields.len() >= 2 {
        fields[..fields.len().min(keep)].join(":")
    } else {
        format!("{}:", fields[0])
    }
}

/// Whether a translated status marks the end of a build
pub fn is_stopped(translated: &str) -> bool {
    translated.starts_with("stopped:")
}

/// Link to a package's build log under the data directory.
pub fn format_log(data_url: &str, pkgname: &str, errors: bool, text: &str) -> String {
    format!(
        r#"<a target="logs" title="Log for {p}" href="{d}logs/{e}{p}.log"><span class="glyphicon glyphicon-file"></span>{t}</a>"#,
        p = escape_html(pkgname),
        d = data_url,
        e = if errors { "errors/" } else { "" },
        t = escape_html(text),
    )
}

/// Skip count of a failed/ignored package, linked to the skipped table.
pub fn format_skipped(skipped_cnt: i64, pkgname: &str) -> String {
    if skipped_cnt == 0 {
        return "0".to_string();
    }
    format!(
        r##"<a href="#skipped" title="Packages skipped due to {p}" data-filter="{p}"><span class="glyphicon glyphicon-filter"></span>{n}</a>"##,
        p = escape_html(pkgname),
        n = skipped_cnt,
    )
}

/// History page of a master
pub fn jail_url(style: ServerStyle, mastername: &str) -> String {
    match style {
        ServerStyle::Hosted if mastername.is_empty() => "#".to_string(),
        ServerStyle::Hosted => format!(
            "jail.html?mastername={}",
            urlencoding::encode(mastername)
        ),
        ServerStyle::Inline => "../".to_string(),
    }
}

/// Detail page of a build
pub fn build_url(mastername: &str, buildname: &str) -> String {
    if mastername.is_empty() || buildname.is_empty() {
        return String::new();
    }
    format!(
        "build.html?mastername={}&build={}",
        urlencoding::encode(mastername),
        urlencoding::encode(buildname)
    )
}

fn top_link(text: &str) -> String {
    format!(r##"<a href="#top">{}</a>"##, escape_html(text))
}

pub fn format_master_name(ctx: &PageContext, mastername: &str) -> String {
    if mastername.is_empty() {
        return String::new();
    }
    if ctx.kind == PageKind::Jail && ctx.mastername.as_deref() == Some(mastername) {
        return top_link(mastername);
    }
    format!(
        r#"<a title="List builds for {m}" href="{u}">{m}</a>"#,
        m = escape_html(mastername),
        u = escape_html(&jail_url(ctx.style, mastername)),
    )
}

pub fn format_build_name(ctx: &PageContext, mastername: &str, buildname: &str) -> String {
    if mastername.is_empty() {
        return escape_html(buildname);
    }
    if buildname.is_empty() {
        return String::new();
    }
    if ctx.kind == PageKind::Build
        && ctx.mastername.as_deref() == Some(mastername)
        && ctx.buildname.as_deref() == Some(buildname)
    {
        return top_link(buildname);
    }
    format!(
        r#"<a title="Show build results for {b}" href="{u}">{b}</a>"#,
        b = escape_html(buildname),
        u = escape_html(&build_url(mastername, buildname)),
    )
}
