//! Email Templates

use askama::Template;
use kernel::event::EmailEventData;

use crate::dispatcher::EmailKind;
use crate::error::MailerError;

/// Subject and both bodies of one mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Template)]
#[template(path = "verify_email.html")]
struct VerifyEmailHtml<'a> {
    name: &'a str,
    link: &'a str,
    expiry: &'a str,
}

#[derive(Template)]
#[template(path = "verify_email.txt")]
struct VerifyEmailText<'a> {
    name: &'a str,
    link: &'a str,
    expiry: &'a str,
}

#[derive(Template)]
#[template(path = "reset_password.html")]
struct ResetPasswordHtml<'a> {
    name: &'a str,
    link: &'a str,
    expiry: &'a str,
}

#[derive(Template)]
#[template(path = "reset_password.txt")]
struct ResetPasswordText<'a> {
    name: &'a str,
    link: &'a str,
    expiry: &'a str,
}

pub fn render(kind: EmailKind, data: &EmailEventData) -> Result<RenderedEmail, MailerError> {
    let (name, link, expiry) = (data.name.as_str(), data.link.as_str(), data.expiry.as_str());
    let rendered = match kind {
        EmailKind::Verify => RenderedEmail {
            subject: "Verify your email address".to_string(),
            text: VerifyEmailText { name, link, expiry }.render()?,
            html: VerifyEmailHtml { name, link, expiry }.render()?,
        },
        EmailKind::ResetPassword => RenderedEmail {
            subject: "Reset your password".to_string(),
            text: ResetPasswordText { name, link, expiry }.render()?,
            html: ResetPasswordHtml { name, link, expiry }.render()?,
        },
    };
    Ok(rendered)
}
