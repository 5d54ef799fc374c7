use std::fmt::Write;

use crate::markdown;
use crate::message::Message;
use crate::modpack::{Item, ItemList, ModpackMeta};

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wraps `body` in the site layout. `body` must already be escaped.
pub fn layout(title: &str, body: &str, user: Option<&str>, messages: &[Message]) -> String {
    let title = escape(title);

    let account = match user {
        Some(user) => format!(
            r#"<a href="/admin">{}</a> <a href="/logout">Log out</a>"#,
            escape(user)
        ),
        None => r#"<a href="/login">Log in</a>"#.to_string(),
    };

    let mut banners = String::new();
    for msg in messages {
        let _ = write!(
            banners,
            r#"<div class="msg msg-{}">{}</div>"#,
            msg.kind.as_str(),
            escape(&msg.text)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/css/style.css">
</head>
<body>
<nav><a href="/">Home</a> {account}</nav>
<div class="messages">{banners}</div>
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>
"#
    )
}

fn icon_url(meta: &ModpackMeta) -> String {
    format!("/api/v1/icons/{}", urlencoding::encode(&meta.icon))
}

pub fn home(meta: &ModpackMeta, counts: &[(ItemList, usize)]) -> String {
    let mut lists = String::new();
    for (list, count) in counts {
        let _ = write!(
            lists,
            r#"<li>{}: {count} <a href="/api/v1/items/{}">(json)</a></li>"#,
            list.display_name(),
            list.table()
        );
    }

    format!(
        r#"<section class="modpack">
<img src="{icon}" alt="icon" width="128" height="128">
<h2>{name} <small>{version}</small></h2>
<div class="description">{description}</div>
<ul>{lists}</ul>
</section>"#,
        icon = escape(&icon_url(meta)),
        name = escape(&meta.name),
        version = escape(&meta.version),
        description = markdown::render(&meta.description),
    )
}

/// `html` must already be sanitized.
pub fn docs(html: &str) -> String {
    format!(r#"<article class="docs">{html}</article>"#)
}

pub fn login() -> String {
    r#"<form method="post" action="/login">
<label>Username <input name="username" autocomplete="username" required></label>
<label>Password <input name="password" type="password" autocomplete="current-password" required></label>
<label><input name="remember_me" type="checkbox"> Remember me</label>
<button type="submit">Log in</button>
</form>"#
        .to_string()
}

pub fn admin_home(username: &str) -> String {
    let mut editors = String::new();
    for list in ItemList::ALL {
        let _ = write!(
            editors,
            r#"<li><a href="/admin/modpack/{}">{}</a></li>"#,
            list.table(),
            list.display_name()
        );
    }

    format!(
        r#"<p>Logged in as {}.</p>
<ul>
<li><a href="/admin/modpack">Modpack details</a></li>
{editors}
</ul>"#,
        escape(username)
    )
}

pub fn modpack_editor(meta: &ModpackMeta) -> String {
    format!(
        r#"<img src="{icon}" alt="icon" width="128" height="128">
<form method="post" action="/admin/modpack/update" enctype="multipart/form-data">
<label>Name <input name="name" value="{name}" required></label>
<label>Version <input name="version" value="{version}" required></label>
<label>Description <textarea name="description">{description}</textarea></label>
<label>Icon <input name="icon" type="file" accept="image/jpeg"></label>
<button type="submit">Update</button>
</form>"#,
        icon = escape(&icon_url(meta)),
        name = escape(&meta.name),
        version = escape(&meta.version),
        description = escape(&meta.description),
    )
}

pub fn item_editor(list: ItemList, meta: &ModpackMeta, items: &[Item]) -> String {
    let mut rows = String::new();
    for item in items {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&item.project_id),
            escape(&item.project_name),
            escape(&item.project_source),
            escape(&item.applied_versions.join(", ")),
            escape(&item.tags.join(", ")),
        );
    }

    let table = if items.is_empty() {
        "<p>No items yet.</p>".to_string()
    } else {
        format!(
            "<table><tr><th>Id</th><th>Name</th><th>Source</th><th>Versions</th><th>Tags</th></tr>{rows}</table>"
        )
    };

    let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".into());

    format!(
        r#"<p>{name} {version}</p>
{table}
<form method="post" action="/admin/modpack/{id}/update">
<label>Items (JSON) <textarea name="items" rows="20" cols="80">{json}</textarea></label>
<button type="submit">Save</button>
</form>"#,
        name = escape(&meta.name),
        version = escape(&meta.version),
        id = list.table(),
        json = escape(&json),
    )
}

pub fn error(message: &str) -> String {
    format!("<p>{}</p>", escape(message))
}
