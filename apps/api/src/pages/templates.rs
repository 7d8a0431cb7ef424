//! HTML rendering for the public pages. All interpolated values go through
//! [`escape_html`].

use crate::config::Config;

pub const TERMS_LAST_UPDATED: &str = "January 1, 2026";
pub const PRIVACY_LAST_UPDATED: &str = "January 1, 2026";

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(config: &Config, title: &str, body: &str) -> String {
    let app_name = escape_html(&config.app_name);
    let company = escape_html(&config.company_name);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} | {app_name}</title>
    <style>
        * {{ box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            color: #1f2933;
            background: #ffffff;
        }}
        header, footer {{ padding: 1rem 2rem; border-bottom: 1px solid #e5e7eb; }}
        footer {{ border-top: 1px solid #e5e7eb; border-bottom: none; font-size: 0.875rem; color: #6b7280; }}
        header a, footer a {{ margin-right: 1rem; color: inherit; text-decoration: none; }}
        main {{ max-width: 48rem; margin: 0 auto; padding: 2rem; }}
        .card {{ border: 1px solid #e5e7eb; border-radius: 0.625rem; padding: 1.5rem; margin-bottom: 1rem; }}
        .button {{ display: inline-block; padding: 0.625rem 1.25rem; border-radius: 0.5rem; border: 1px solid #d1d5db; color: inherit; text-decoration: none; }}
        .error {{ background: #fef2f2; color: #b91c1c; border-radius: 0.375rem; padding: 0.75rem; }}
        .muted {{ color: #6b7280; }}
    </style>
</head>
<body>
    <header><a href="/"><strong>{app_name}</strong></a><a href="/login">Sign in</a></header>
    <main>
{body}
    </main>
    <footer>
        &copy; {company}
        <a href="/terms">Terms of Service</a>
        <a href="/privacy">Privacy Policy</a>
    </footer>
</body>
</html>"#,
        title = escape_html(title),
    )
}

/// `(title, paragraphs)`; paragraphs are already-escaped HTML.
fn sections(items: &[(&str, Vec<String>)]) -> String {
    items
        .iter()
        .map(|(title, paragraphs)| {
            let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
            format!(
                r#"<section class="card"><h2>{}</h2>{}</section>"#,
                escape_html(title),
                body
            )
        })
        .collect()
}

pub fn home_page(config: &Config) -> String {
    let app_name = escape_html(&config.app_name);
    let body = format!(
        r#"        <h1>{app_name}</h1>
        <p class="muted">Sign in, manage your profile, and upgrade when you need more.</p>
        <div class="card">
            <h2>Get started</h2>
            <p>Sign in with your Google account to create your profile.</p>
            <a class="button" href="/login">Sign in</a>
        </div>
        <div class="card">
            <h2>Plans</h2>
            <p>Free, Pro and Enterprise tiers, billed through Stripe. Cancel any time.</p>
        </div>"#
    );
    layout(config, "Home", &body)
}

pub fn login_page(config: &Config, callback_url: &str, error: Option<&str>) -> String {
    let href: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("callback_url", callback_url)
        .finish();
    let error_html = error
        .map(|code| {
            format!(
                r#"<div class="error">Sign in failed ({}). Please try again.</div>"#,
                escape_html(code)
            )
        })
        .unwrap_or_default();

    let body = format!(
        r#"        <div class="card">
            <h1>Welcome!</h1>
            <p class="muted">We respect your privacy. No spam, no data selling, ever.</p>
            {error_html}
            <p><a class="button" href="/api/auth/sign-in/google?{href}">Sign in with Google</a></p>
            <p class="muted"><a href="/privacy">Privacy Policy</a></p>
        </div>"#,
        href = escape_html(&href),
    );
    layout(config, "Sign in", &body)
}

pub fn terms_page(config: &Config) -> String {
    let app = escape_html(&config.app_name);
    let company = escape_html(&config.company_name);
    let email = escape_html(&config.support_email);
    let url = escape_html(&config.app_url);

    let body = format!(
        r#"        <h1>Terms of Service</h1>
        <p class="muted">Last updated: {TERMS_LAST_UPDATED}</p>
{}"#,
        sections(&[
            ("Introduction", vec![format!(
                "These Terms of Service govern your use of {app} at {url}, operated by {company}. \
                 By using {app} you agree to these terms."
            )]),
            ("Communications", vec![format!(
                "By creating an account you agree to receive service emails from {company}. \
                 You can opt out of non-essential messages at any time."
            )]),
            ("Accounts", vec![
                "You sign in with a third-party identity provider and are responsible for activity under your account.".to_string(),
                format!("Notify us at <a href=\"mailto:{email}\">{email}</a> of any unauthorized use."),
            ]),
            ("Intellectual Property", vec![format!(
                "{app} and its original content remain the property of {company}."
            )]),
            ("User Data", vec![
                "You keep ownership of the content you add to your profile. \
                 You can delete your profile at any time from your account."
                    .to_string(),
            ]),
            ("Third-Party Services", vec![
                "Payments are processed by Stripe and sign-in is provided by Google. Their terms apply to those services.".to_string(),
            ]),
            ("Changes to Terms", vec![format!(
                "{company} may revise these terms. Continued use after changes take effect means you accept them."
            )]),
            ("Limitation of Liability", vec![format!(
                "{company} is not liable for indirect or consequential damages arising from your use of {app}."
            )]),
            ("Contact Us", vec![format!(
                "Questions about these terms: <a href=\"mailto:{email}\">{email}</a>."
            )]),
        ])
    );
    layout(config, "Terms of Service", &body)
}

pub fn privacy_page(config: &Config) -> String {
    let app = escape_html(&config.app_name);
    let company = escape_html(&config.company_name);
    let email = escape_html(&config.support_email);

    let body = format!(
        r#"        <h1>Privacy Policy</h1>
        <p class="muted">Last updated: {PRIVACY_LAST_UPDATED}</p>
{}"#,
        sections(&[
            ("Introduction", vec![format!(
                "{company} operates {app}. This policy explains what we collect and how we use it."
            )]),
            ("Information We Collect", vec![
                "Your name, email address and profile picture from your sign-in provider, the profile details you enter, and billing records from Stripe.".to_string(),
            ]),
            ("Data Retention and Deletion", vec![format!(
                "We keep your data while your account is active. Request deletion at <a href=\"mailto:{email}\">{email}</a>."
            )]),
            ("How We Use Your Information", vec![format!(
                "To operate {app}, process payments, and contact you about your account."
            )]),
            ("Data Sharing and Third Parties", vec![
                "We share data only with the processors needed to run the service (Google for sign-in, Stripe for payments). We never sell your data.".to_string(),
            ]),
            ("Cookies and Tracking", vec![
                "We set a single session cookie to keep you signed in. We do not use advertising trackers.".to_string(),
            ]),
            ("Data Security", vec![
                "Session cookies are signed and sent over HTTPS in production.".to_string(),
            ]),
            ("Changes to This Policy", vec![format!(
                "{company} will post changes on this page and update the date above."
            )]),
            ("Contact Us", vec![format!(
                "Privacy questions: <a href=\"mailto:{email}\">{email}</a>."
            )]),
        ])
    );
    layout(config, "Privacy Policy", &body)
}

pub fn not_found_page(config: &Config) -> String {
    let body = r#"        <div class="card">
            <h1>404</h1>
            <p>Page not found</p>
            <p class="muted">The page you&#x27;re looking for doesn&#x27;t exist or has been moved.</p>
            <a class="button" href="/">Go back home</a>
        </div>"#;
    layout(config, "Not found", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x&y")</script>'"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;&#x27;"
        );
    }

    #[test]
    fn test_config_values_are_escaped() {
        let config = Config {
            app_name: "<b>Evil</b>".to_string(),
            ..Config::for_tests()
        };
        let html = home_page(&config);
        assert!(html.contains("&lt;b&gt;Evil&lt;/b&gt;"));
        assert!(!html.contains("<b>Evil</b>"));
    }

    #[test]
    fn test_login_link_carries_callback_url() {
        let html = login_page(&Config::for_tests(), "/account?tab=billing", None);
        assert!(html.contains("/api/auth/sign-in/google?callback_url=%2Faccount%3Ftab%3Dbilling"));
        assert!(!html.contains("class=\"error\""));
    }

    #[test]
    fn test_login_error_shown() {
        let html = login_page(&Config::for_tests(), "/", Some("access_denied"));
        assert!(html.contains("Sign in failed (access_denied)"));
    }

    #[test]
    fn test_legal_pages_name_the_company() {
        let config = Config::for_tests();
        let terms = terms_page(&config);
        let privacy = privacy_page(&config);
        for html in [&terms, &privacy] {
            assert!(html.contains("Launchpad Inc"));
            assert!(html.contains("help@launchpad.test"));
        }
        assert!(terms.contains("Limitation of Liability"));
        assert!(privacy.contains("Cookies and Tracking"));
    }
}
