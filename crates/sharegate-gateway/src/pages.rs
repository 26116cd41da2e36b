//! Server-rendered HTML pages.
//!
//! Every page is assembled from typed render functions; all interpolated
//! values pass through [`escape_html`] first, so user-controlled strings can
//! never break out of their text position. Error and success banners are
//! driven by short machine codes carried in query strings and mapped to
//! messages here, never echoed verbatim.

/// Shared stylesheet for all gateway pages.
const PAGE_STYLES: &str = r"
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body {
    font-family: -apple-system, 'Segoe UI', Roboto, sans-serif;
    background: #f0f2f5; color: #1c1e21;
    display: flex; align-items: center; justify-content: center;
    min-height: 100vh; padding: 20px;
  }
  .card {
    background: #fff; border-radius: 8px; padding: 32px;
    box-shadow: 0 2px 12px rgba(0,0,0,0.1);
    width: 100%; max-width: 420px;
  }
  .card.wide { max-width: 640px; }
  h1 { font-size: 22px; margin-bottom: 8px; }
  p.hint { color: #606770; font-size: 14px; margin-bottom: 20px; }
  label { display: block; font-size: 14px; margin: 12px 0 4px; }
  input {
    width: 100%; padding: 10px; font-size: 15px;
    border: 1px solid #ccd0d5; border-radius: 6px;
  }
  button {
    width: 100%; margin-top: 20px; padding: 10px;
    font-size: 15px; font-weight: 600; color: #fff;
    background: #1877f2; border: 0; border-radius: 6px; cursor: pointer;
  }
  button:hover { background: #166fe5; }
  button.danger { background: #d93025; width: auto; margin: 0; padding: 6px 12px; font-size: 13px; }
  button.secondary { background: #606770; width: auto; margin: 0; padding: 6px 12px; font-size: 13px; }
  .banner { border-radius: 6px; padding: 10px 12px; font-size: 14px; margin-bottom: 16px; }
  .banner.error { background: #fdecea; color: #b3261e; border: 1px solid #f5c6c0; }
  .banner.success { background: #e6f4ea; color: #137333; border: 1px solid #c6e7cd; }
  table { width: 100%; border-collapse: collapse; margin-top: 16px; }
  th, td { text-align: left; padding: 8px 6px; border-bottom: 1px solid #e4e6eb; font-size: 14px; }
  .actions { display: flex; gap: 8px; }
  a { color: #1877f2; text-decoration: none; font-size: 14px; }
  a:hover { text-decoration: underline; }
  .footer { margin-top: 20px; text-align: center; }
  .status { font-size: 72px; text-align: center; margin-bottom: 8px; color: #606770; }
";

/// Escape a string for interpolation into HTML text or attribute values.
#[must_use]
pub fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(title: &str, wide: bool, body: &str) -> String {
    let card_class = if wide { "card wide" } else { "card" };
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{PAGE_STYLES}</style>\n</head>\n\
         <body>\n<div class=\"{card_class}\">\n{body}\n</div>\n</body>\n</html>",
        title = escape_html(title),
    )
}

fn error_banner(message: &str) -> String {
    format!("<div class=\"banner error\">{}</div>", escape_html(message))
}

fn success_banner(message: &str) -> String {
    format!("<div class=\"banner success\">{}</div>", escape_html(message))
}

// ── First-run setup ──

fn setup_error_message(code: &str) -> &'static str {
    match code {
        "short" => "The master passphrase must be at least 8 characters.",
        "mismatch" => "The two passphrases do not match.",
        "encrypt_failed" => "Failed to encrypt the master passphrase. See the server logs.",
        "write_failed" => "Failed to save the master passphrase. Check file permissions on the data directory.",
        _ => "Setup failed. Please try again.",
    }
}

/// First-run setup form.
#[must_use]
pub fn render_setup(error_code: Option<&str>) -> String {
    let banner = error_code.map_or_else(String::new, |c| error_banner(setup_error_message(c)));
    let body = format!(
        "<h1>First-run setup</h1>\n\
         <p class=\"hint\">Choose a master passphrase. It unlocks user administration;\n\
         to reset it later, delete the master credential file and restart the gateway.</p>\n\
         {banner}\
         <form method=\"post\" action=\"/do_setup\">\n\
         <label for=\"newPassword\">Master passphrase</label>\n\
         <input type=\"password\" id=\"newPassword\" name=\"newPassword\" minlength=\"8\" required autofocus>\n\
         <label for=\"confirmPassword\">Confirm passphrase</label>\n\
         <input type=\"password\" id=\"confirmPassword\" name=\"confirmPassword\" minlength=\"8\" required>\n\
         <button type=\"submit\">Save and start</button>\n\
         </form>"
    );
    page("Setup — Sharegate", false, &body)
}

/// Confirmation page after a successful setup.
#[must_use]
pub fn render_setup_done() -> String {
    let body = "<h1>Setup complete</h1>\n\
        <p class=\"hint\">The master passphrase is saved and the application is starting.</p>\n\
        <div class=\"footer\"><a href=\"/login\">Continue to sign in</a></div>";
    page("Setup complete — Sharegate", false, body)
}

/// 403 page for a setup form submitted after setup already completed.
#[must_use]
pub fn render_setup_forbidden() -> String {
    let body = "<div class=\"status\">403</div>\n\
        <h1>Setup already complete</h1>\n\
        <p class=\"hint\">A master passphrase is already configured and cannot be\n\
        overwritten from here. To reset it, delete the master credential file and\n\
        restart the gateway.</p>\n\
        <div class=\"footer\"><a href=\"/login\">Go to sign in</a></div>";
    page("Setup already complete — Sharegate", false, body)
}

// ── Login ──

fn login_error_message(code: &str) -> &'static str {
    match code {
        "invalid" => "Invalid username or password.",
        "decrypt_failed" => {
            "Could not verify the password: a credential file cannot be decrypted. \
             The key material may have changed."
        }
        "read_failed" => "Could not read the credential files. See the server logs.",
        "no_user_file" => "No user accounts exist yet. Sign in as master to create one.",
        "master_not_set" => "The master passphrase has not been set yet.",
        _ => "Sign-in failed. Please try again.",
    }
}

fn login_info_message(code: &str) -> &'static str {
    match code {
        "logged_out" => "You have been signed out.",
        _ => "",
    }
}

/// Login form. `return_to` survives the round trip as a hidden query
/// parameter on the form action.
#[must_use]
pub fn render_login(
    error_code: Option<&str>,
    info_code: Option<&str>,
    return_to: Option<&str>,
) -> String {
    let mut banners = String::new();
    if let Some(code) = error_code {
        banners.push_str(&error_banner(login_error_message(code)));
    }
    if let Some(code) = info_code {
        let message = login_info_message(code);
        if !message.is_empty() {
            banners.push_str(&success_banner(message));
        }
    }
    let action = return_to.map_or_else(
        || "/do_login".to_owned(),
        |r| format!("/do_login?returnTo={}", escape_html(&urlencoding::encode(r))),
    );
    let body = format!(
        "<h1>Sign in</h1>\n\
         <p class=\"hint\">Leave the username blank to sign in as master.</p>\n\
         {banners}\
         <form method=\"post\" action=\"{action}\">\n\
         <label for=\"username\">Username</label>\n\
         <input type=\"text\" id=\"username\" name=\"username\" autofocus>\n\
         <label for=\"password\">Password</label>\n\
         <input type=\"password\" id=\"password\" name=\"password\" required>\n\
         <button type=\"submit\">Sign in</button>\n\
         </form>"
    );
    page("Sign in — Sharegate", false, &body)
}

// ── User administration ──

fn user_admin_error_message(code: &str) -> &'static str {
    match code {
        "user_exists" => "That username is already taken.",
        "user_not_found" => "No such user.",
        "invalid_username" => {
            "Usernames need at least 3 characters: letters, digits, '_', '.' or '-'. \
             'master' is reserved."
        }
        "missing_fields" => "All fields are required.",
        "password_empty" => "The password cannot be empty.",
        "password_mismatch" => "The two passwords do not match.",
        "load_failed" => {
            "The user credential file cannot be read. The key material may have changed."
        }
        _ => "The operation failed. See the server logs.",
    }
}

fn user_admin_success_message(code: &str) -> &'static str {
    match code {
        "user_added" => "User created.",
        "user_deleted" => "User deleted.",
        "password_changed" => "Password updated.",
        _ => "Done.",
    }
}

/// The user administration panel: banner area, user table, add-user form.
#[must_use]
pub fn render_user_admin(
    usernames: &[String],
    error_code: Option<&str>,
    success_code: Option<&str>,
) -> String {
    let mut banners = String::new();
    if let Some(code) = error_code {
        banners.push_str(&error_banner(user_admin_error_message(code)));
    }
    if let Some(code) = success_code {
        banners.push_str(&success_banner(user_admin_success_message(code)));
    }

    let rows = if usernames.is_empty() {
        "<tr><td colspan=\"2\">No users yet.</td></tr>".to_owned()
    } else {
        usernames
            .iter()
            .map(|name| {
                let escaped = escape_html(name);
                format!(
                    "<tr><td>{escaped}</td><td class=\"actions\">\n\
                     <form method=\"post\" action=\"/user-admin/change-password-page\">\n\
                     <input type=\"hidden\" name=\"usernameToChange\" value=\"{escaped}\">\n\
                     <button type=\"submit\" class=\"secondary\">Change password</button>\n\
                     </form>\n\
                     <form method=\"post\" action=\"/user-admin/delete\">\n\
                     <input type=\"hidden\" name=\"usernameToDelete\" value=\"{escaped}\">\n\
                     <button type=\"submit\" class=\"danger\">Delete</button>\n\
                     </form>\n\
                     </td></tr>"
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let body = format!(
        "<h1>User administration</h1>\n\
         {banners}\
         <table>\n<tr><th>Username</th><th></th></tr>\n{rows}\n</table>\n\
         <form method=\"post\" action=\"/user-admin/add\">\n\
         <h1 style=\"margin-top:24px;font-size:18px\">Add user</h1>\n\
         <label for=\"newUsername\">Username</label>\n\
         <input type=\"text\" id=\"newUsername\" name=\"newUsername\" required>\n\
         <label for=\"newPassword\">Password</label>\n\
         <input type=\"password\" id=\"newPassword\" name=\"newPassword\" required>\n\
         <label for=\"confirmPassword\">Confirm password</label>\n\
         <input type=\"password\" id=\"confirmPassword\" name=\"confirmPassword\" required>\n\
         <button type=\"submit\">Add user</button>\n\
         </form>\n\
         <div class=\"footer\"><a href=\"/admin\">Open the site admin</a> · <a href=\"/logout\">Sign out</a></div>"
    );
    page("User administration — Sharegate", true, &body)
}

/// Change-password form for one user.
#[must_use]
pub fn render_change_password(username: &str, error_code: Option<&str>) -> String {
    let banner = error_code.map_or_else(String::new, |c| error_banner(user_admin_error_message(c)));
    let escaped = escape_html(username);
    let body = format!(
        "<h1>Change password</h1>\n\
         <p class=\"hint\">Setting a new password for <strong>{escaped}</strong>.</p>\n\
         {banner}\
         <form method=\"post\" action=\"/user-admin/perform-change-password\">\n\
         <input type=\"hidden\" name=\"username\" value=\"{escaped}\">\n\
         <label for=\"newPassword\">New password</label>\n\
         <input type=\"password\" id=\"newPassword\" name=\"newPassword\" required autofocus>\n\
         <label for=\"confirmPassword\">Confirm password</label>\n\
         <input type=\"password\" id=\"confirmPassword\" name=\"confirmPassword\" required>\n\
         <button type=\"submit\">Update password</button>\n\
         </form>\n\
         <div class=\"footer\"><a href=\"/user-admin\">Back to user administration</a></div>"
    );
    page("Change password — Sharegate", false, &body)
}

// ── Error pages ──

/// 403 page shown when a non-master session reaches the user-admin area.
#[must_use]
pub fn render_access_denied(requested: &str) -> String {
    let body = format!(
        "<div class=\"status\">403</div>\n\
         <h1>Access denied</h1>\n\
         <p class=\"hint\">This area requires a master session.</p>\n\
         <div class=\"footer\"><a href=\"/login?returnTo={}\">Sign in as master</a></div>",
        escape_html(&urlencoding::encode(requested)),
    );
    page("Access denied — Sharegate", false, &body)
}

/// 502 page shown when the supervised application is unreachable.
#[must_use]
pub fn render_proxy_error() -> String {
    let body = "<div class=\"status\">502</div>\n\
        <h1>Application unavailable</h1>\n\
        <p class=\"hint\">The application is not responding. It may still be starting;\n\
        try again in a few seconds.</p>\n\
        <div class=\"footer\"><a href=\"/\">Try again</a> · <a href=\"/logout\">Sign out</a></div>";
    page("Application unavailable — Sharegate", false, body)
}

/// Generic 500 page. Carries no detail; the cause is in the logs.
#[must_use]
pub fn render_internal_error() -> String {
    let body = "<div class=\"status\">500</div>\n\
        <h1>Something went wrong</h1>\n\
        <p class=\"hint\">The gateway hit an unexpected error. Details are in the server logs.</p>";
    page("Server error — Sharegate", false, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_covers_the_dangerous_five() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn usernames_are_escaped_in_the_panel() {
        let users = vec!["<script>alert(1)</script>".to_owned()];
        let html = render_user_admin(&users, None, None);
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn unknown_error_codes_fall_back_to_generic_text() {
        let html = render_login(Some("<img src=x>"), None, None);
        assert!(!html.contains("<img src=x>"));
        assert!(html.contains("Sign-in failed"));
    }

    #[test]
    fn return_to_is_encoded_into_the_form_action() {
        let html = render_login(None, None, Some("/admin/files?page=2"));
        assert!(html.contains("/do_login?returnTo=%2Fadmin%2Ffiles%3Fpage%3D2"));
    }

    #[test]
    fn logout_info_renders_a_success_banner() {
        let html = render_login(None, Some("logged_out"), None);
        assert!(html.contains("signed out"));
    }
}
