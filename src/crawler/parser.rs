//! HTML parser for repository listings
//!
//! This module handles parsing HTML pages to extract:
//! - Repository links from organization listing pages
//! - Repository cards (description, language, stars) from user pages
//! - Developer logins from the trending page
//!
//! Every function is synchronous and drops the parsed document before
//! returning, so callers can hold the results across `.await` points.
//! Unknown markup yields empty results, never an error.

use crate::storage::{repository_id, Repository};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Path roots that are site sections, not owners
const RESERVED_ROOTS: &[&str] = &[
    "about",
    "apps",
    "collections",
    "contact",
    "customer-stories",
    "enterprise",
    "events",
    "explore",
    "features",
    "issues",
    "login",
    "marketplace",
    "new",
    "notifications",
    "orgs",
    "pricing",
    "pulls",
    "search",
    "security",
    "settings",
    "signup",
    "site",
    "sponsors",
    "topics",
    "trending",
    "users",
];

/// A repository reference found in a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLink {
    pub owner: String,
    pub name: String,
}

impl RepoLink {
    pub fn id(&self) -> String {
        repository_id(&self.owner, &self.name)
    }

    /// Builds a repository record with its page URL under `html_base`
    pub fn to_repository(&self, html_base: &str) -> Repository {
        let url = format!(
            "{}/{}/{}",
            html_base.trim_end_matches('/'),
            self.owner,
            self.name
        );
        Repository::new(self.owner.as_str(), self.name.as_str(), url)
    }
}

/// A repository card scraped from a user's repositories tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedRepo {
    pub link: RepoLink,
    pub description: String,
    pub language: String,
    pub stars: u64,
}

impl ScrapedRepo {
    pub fn to_repository(&self, html_base: &str) -> Repository {
        let mut repository = self.link.to_repository(html_base);
        repository.description = self.description.clone();
        repository.language = self.language.clone();
        repository.stars = self.stars;
        repository
    }
}

/// Extracts `owner/name` from a repository href found on a page under `html_base`
///
/// Site-relative paths (`/owner/name`, `/owner/name/issues`) are resolved
/// against `html_base`; absolute URLs must share its origin. Query strings
/// and fragments are ignored.
///
/// # Example
///
/// ```
/// use forge_ripple::crawler::parse_repo_href;
///
/// let base = "https://github.com";
/// let link = parse_repo_href("/rust-lang/cargo/pulls?q=is%3Aopen", base).unwrap();
/// assert_eq!(link.id(), "rust-lang/cargo");
/// assert!(parse_repo_href("/topics/rust", base).is_none());
/// assert!(parse_repo_href("https://example.com/rust-lang/cargo", base).is_none());
/// ```
pub fn parse_repo_href(href: &str, html_base: &str) -> Option<RepoLink> {
    repo_link(href, &Url::parse(html_base).ok()?)
}

fn repo_link(href: &str, base: &Url) -> Option<RepoLink> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let url = base.join(href).ok()?;
    if url.origin() != base.origin() {
        return None;
    }

    let mut segments = url.path().split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let name = segments.next()?;

    if RESERVED_ROOTS.contains(&owner.to_lowercase().as_str()) || !is_path_segment(owner) || !is_path_segment(name) {
        return None;
    }

    Some(RepoLink {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

fn is_path_segment(segment: &str) -> bool {
    segment
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collapses an element's text into one trimmed line
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts repository links from an organization listing page
///
/// # Selector Strategies
///
/// | Selector | Accepted hrefs |
/// |----------|----------------|
/// | `a[data-hovercard-type='repository']` | any repository path |
/// | `h3 a` | any repository path |
/// | `li.Box-row a` | only paths containing `/{org}/` |
///
/// Results keep document order and are deduplicated. Links leaving
/// `html_base` are skipped.
pub fn parse_org_repositories(html: &str, org: &str, html_base: &str) -> Vec<RepoLink> {
    let Ok(base) = Url::parse(html_base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let org_path = format!("/{}/", org);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let strategies: [(&str, bool); 3] = [
        ("a[data-hovercard-type='repository']", false),
        ("h3 a", false),
        ("li.Box-row a", true),
    ];

    for (css, org_only) in strategies {
        let Some(sel) = selector(css) else {
            continue;
        };
        for element in document.select(&sel) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if org_only && !href.contains(&org_path) {
                continue;
            }
            if let Some(link) = repo_link(href, &base) {
                if seen.insert(link.id()) {
                    links.push(link);
                }
            }
        }
    }

    links
}

/// Extracts repository cards from a `?tab=repositories` user page
///
/// Cards are `li` elements holding an `itemprop="name codeRepository"` link;
/// description, language and star count are read from inside the card.
pub fn parse_user_repositories(html: &str, html_base: &str) -> Vec<ScrapedRepo> {
    let Ok(base) = Url::parse(html_base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let (Some(card_sel), Some(name_sel)) = (selector("li"), selector("a[itemprop~='codeRepository']")) else {
        return Vec::new();
    };
    let description_sel = selector("[itemprop='description']");
    let language_sel = selector("[itemprop='programmingLanguage']");
    let stars_sel = selector("a[href$='/stargazers']");

    let first_text = |card: &ElementRef<'_>, sel: &Option<Selector>| -> String {
        sel.as_ref()
            .and_then(|s| card.select(s).next())
            .map(|e| element_text(&e))
            .unwrap_or_default()
    };

    let mut seen = HashSet::new();
    let mut repos = Vec::new();

    for card in document.select(&card_sel) {
        let Some(link) = card
            .select(&name_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| repo_link(href, &base))
        else {
            continue;
        };
        if !seen.insert(link.id()) {
            continue;
        }

        repos.push(ScrapedRepo {
            link,
            description: first_text(&card, &description_sel),
            language: first_text(&card, &language_sel),
            stars: parse_stars(&first_text(&card, &stars_sel)),
        });
    }

    repos
}

/// Extracts developer logins from the trending developers page
pub fn parse_trending_developers(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut logins = Vec::new();

    for css in ["h1.h3 a", "article h1 a"] {
        let Some(sel) = selector(css) else {
            continue;
        };
        for element in document.select(&sel) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let path = href.trim().trim_matches('/');
            if path.is_empty() || path.contains('/') || !is_path_segment(path) {
                continue;
            }
            if RESERVED_ROOTS.contains(&path.to_lowercase().as_str()) {
                continue;
            }
            if seen.insert(path.to_string()) {
                logins.push(path.to_string());
            }
        }
    }

    logins
}

/// Parses a displayed star count such as `1,234`, `12.5k` or `3m`
///
/// Unparseable text counts as zero.
pub fn parse_stars(text: &str) -> u64 {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let lower = cleaned.to_lowercase();

    let (number, multiplier) = if let Some(n) = lower.strip_suffix('k') {
        (n, 1_000.0)
    } else if let Some(n) = lower.strip_suffix('m') {
        (n, 1_000_000.0)
    } else {
        (lower.as_str(), 1.0)
    };

    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://github.com";

    #[test]
    fn test_parse_repo_href() {
        let link = parse_repo_href("/rust-lang/rust", BASE).unwrap();
        assert_eq!(link.owner, "rust-lang");
        assert_eq!(link.name, "rust");

        let link = parse_repo_href("https://github.com/tokio-rs/tokio/issues", BASE).unwrap();
        assert_eq!(link.id(), "tokio-rs/tokio");

        assert_eq!(parse_repo_href("/a/b.c?tab=x", BASE).unwrap().name, "b.c");
        assert_eq!(parse_repo_href("/a/b#readme", BASE).unwrap().id(), "a/b");
    }

    #[test]
    fn test_parse_repo_href_rejects_non_repositories() {
        assert!(parse_repo_href("", BASE).is_none());
        assert!(parse_repo_href("#readme", BASE).is_none());
        assert!(parse_repo_href("/solo", BASE).is_none());
        assert!(parse_repo_href("/orgs/acme/repositories", BASE).is_none());
        assert!(parse_repo_href("/Topics/rust", BASE).is_none());
        assert!(parse_repo_href("/a/b c", BASE).is_none());
        assert!(parse_repo_href("/a/b", "not a url").is_none());
    }

    #[test]
    fn test_parse_repo_href_rejects_other_hosts() {
        assert!(parse_repo_href("https://example.com/a/b", BASE).is_none());
        assert!(parse_repo_href("//example.com/a/b", BASE).is_none());
        assert!(parse_repo_href("http://github.com/a/b", BASE).is_none());

        let local = "http://127.0.0.1:8080";
        assert!(parse_repo_href("http://127.0.0.1:8080/a/b", local).is_some());
        assert!(parse_repo_href("http://127.0.0.1:9090/a/b", local).is_none());
    }

    #[test]
    fn test_org_page_all_strategies() {
        let html = r#"
            <html><body>
              <a data-hovercard-type="repository" href="/acme/alpha">alpha</a>
              <h3><a href="/acme/beta">beta</a></h3>
              <h3><a href="/acme/alpha">alpha again</a></h3>
              <ul>
                <li class="Box-row"><a href="/acme/gamma/stargazers">stars</a></li>
                <li class="Box-row"><a href="/someone/else">foreign</a></li>
              </ul>
              <a href="/topics/rust">topic</a>
              <h3><a href="https://mirror.example.com/acme/delta">mirror</a></h3>
            </body></html>
        "#;

        let ids: Vec<_> = parse_org_repositories(html, "acme", BASE)
            .iter()
            .map(RepoLink::id)
            .collect();
        assert_eq!(ids, vec!["acme/alpha", "acme/beta", "acme/gamma"]);
    }

    #[test]
    fn test_org_page_without_matches() {
        assert!(parse_org_repositories("<html><p>nothing</p></html>", "acme", BASE).is_empty());
        assert!(parse_org_repositories("not even html <<<", "acme", BASE).is_empty());
    }

    #[test]
    fn test_user_repositories() {
        let html = r#"
            <ul id="user-repositories-list">
              <li>
                <h3><a href="/octo/hello" itemprop="name codeRepository"> hello </a></h3>
                <p itemprop="description">
                  A friendly   greeting
                </p>
                <span itemprop="programmingLanguage">Rust</span>
                <a href="/octo/hello/stargazers"> 1,234 </a>
              </li>
              <li>
                <h3><a href="/octo/bare" itemprop="name codeRepository">bare</a></h3>
              </li>
              <li><a href="/octo">profile</a></li>
            </ul>
        "#;

        let repos = parse_user_repositories(html, BASE);
        assert_eq!(repos.len(), 2);

        assert_eq!(repos[0].link.id(), "octo/hello");
        assert_eq!(repos[0].description, "A friendly greeting");
        assert_eq!(repos[0].language, "Rust");
        assert_eq!(repos[0].stars, 1234);

        assert_eq!(repos[1].link.id(), "octo/bare");
        assert_eq!(repos[1].description, "");
        assert_eq!(repos[1].stars, 0);

        let repo = repos[0].to_repository("https://github.com/");
        assert_eq!(repo.url, "https://github.com/octo/hello");
        assert_eq!(repo.id, "octo/hello");
    }

    #[test]
    fn test_trending_developers() {
        let html = r#"
            <article><h1 class="h3 lh-condensed"><a href="/alice">Alice</a></h1></article>
            <article><h1><a href="/bob">Bob</a></h1></article>
            <article><h1><a href="/alice">Alice</a></h1></article>
            <article><h1><a href="/alice/repo">repo</a></h1></article>
        "#;

        assert_eq!(parse_trending_developers(html), vec!["alice", "bob"]);
    }

    #[test]
    fn test_parse_stars() {
        assert_eq!(parse_stars("42"), 42);
        assert_eq!(parse_stars(" 1,234 "), 1234);
        assert_eq!(parse_stars("12.5k"), 12_500);
        assert_eq!(parse_stars("3M"), 3_000_000);
        assert_eq!(parse_stars(""), 0);
        assert_eq!(parse_stars("many"), 0);
    }
}
