//! Plain-text rendering of a [`FeedView`] for the CLI.

use std::fmt::Write;

use crate::app::FeedView;
use crate::engine::{ContentKind, FetchState, KindFilter};
use crate::feed::FeedItem;
use crate::util::single_line;

const KIND_ORDER: [KindFilter; 4] = [
    KindFilter::All,
    KindFilter::Text,
    KindFilter::Images,
    KindFilter::Videos,
];

fn kind_label(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Text => "txt",
        ContentKind::Images => "img",
        ContentKind::Videos => "vid",
    }
}

/// Profile, counters and status lines.
pub fn render_summary(view: &FeedView) -> String {
    let mut out = String::new();

    match (&view.profile, &view.profile_error) {
        (Some(p), _) => {
            let name = if p.display_name.is_empty() {
                p.handle.as_str()
            } else {
                p.display_name.as_str()
            };
            let _ = writeln!(
                out,
                "{} (@{}) | {} posts, {} followers, {} following",
                single_line(name, 60),
                p.handle,
                p.posts_count,
                p.followers_count,
                p.follows_count
            );
        }
        (None, Some(e)) => {
            let _ = writeln!(out, "profile unavailable: {e}");
        }
        (None, None) => {
            let _ = writeln!(out, "profile loading...");
        }
    }

    let kinds: Vec<String> = KIND_ORDER
        .iter()
        .map(|&k| {
            let marker = if view.filter.kind == k { "*" } else { "" };
            format!("{marker}{k} {}", view.kind_counts.get(k))
        })
        .collect();
    let _ = writeln!(out, "kinds: {}", kinds.join("  "));

    if !view.tag_counts.is_empty() {
        let tags: Vec<String> = view
            .tag_counts
            .iter()
            .map(|t| {
                let marker = if view.filter.tags.contains(&t.tag) { "*" } else { "" };
                format!("{marker}{} {}", t.tag, t.count)
            })
            .collect();
        let _ = writeln!(out, "tags:  {}", tags.join("  "));
    }

    let status = match view.feed_state {
        FetchState::LoadingFirst => "loading".to_string(),
        FetchState::LoadingMore => "loading more".to_string(),
        FetchState::Error => match &view.feed_error {
            Some(e) => format!("error: {e}"),
            None => "error".to_string(),
        },
        FetchState::Idle if view.has_more => "idle, more available".to_string(),
        FetchState::Idle => "idle, end of feed".to_string(),
    };
    let _ = write!(
        out,
        "showing {} of {} | {}",
        view.items.len(),
        view.kind_counts.all,
        status
    );
    if view.upstream_changed {
        out.push_str(" | new posts upstream, refresh to load");
    }
    out.push('\n');

    out
}

/// One item as `date  kind  text  (likes/reposts/replies)`.
pub fn render_item(item: &FeedItem, width: usize) -> String {
    let counters = format!(
        "  ♥{} ⟳{} ↩{}",
        item.like_count, item.repost_count, item.reply_count
    );
    let prefix = format!(
        "{}  {}  ",
        item.created_at.format("%Y-%m-%d %H:%M"),
        kind_label(item.content_kind())
    );
    let budget = width.saturating_sub(prefix.len() + counters.chars().count());
    format!("{prefix}{}{counters}", single_line(item.display_text(), budget))
}

/// Summary followed by up to `limit` items.
pub fn render(view: &FeedView, limit: usize, width: usize) -> String {
    let mut out = render_summary(view);
    for item in view.items.iter().take(limit) {
        out.push_str(&render_item(item, width));
        out.push('\n');
    }
    if view.items.len() > limit {
        let _ = writeln!(out, "... {} more", view.items.len() - limit);
    }
    out
}
