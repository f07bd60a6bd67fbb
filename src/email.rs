use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;

pub const WELCOME_SUBJECT: &str = "Welcome to BlogPlatform!";
pub const OTP_SUBJECT: &str = "Your BlogPlatform verification code";
pub const RESET_SUBJECT: &str = "Reset your BlogPlatform password";

/// Email dispatch. `Ok(true)` means the relay accepted the message for
/// delivery; transport failures surface as errors so callers can decide
/// how loudly to report them.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<bool>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            .credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ))
            .port(cfg.port)
            .pool_config(PoolConfig::new().max_size(4))
            .build();
        let from = format!("{} <{}>", cfg.from_name, cfg.from_address).parse()?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<bool> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;
        let response = self.transport.send(email).await?;
        Ok(response.is_positive())
    }
}

fn layout(heading: &str, inner: &str) -> String {
    format!(
        r#"<div style="max-width:600px;margin:40px auto;background:#fff;padding:30px;border-radius:8px;box-shadow:0 0 8px rgba(0,0,0,0.1);font-family:Arial,sans-serif;color:#333;">
  <h1 style="color:#007bff;font-size:28px;margin-bottom:20px;">{heading}</h1>
  {inner}
  <p style="font-size:16px;line-height:1.5;">Best regards,<br/>The BlogPlatform Team</p>
  <div style="font-size:12px;color:#777;text-align:center;margin-top:30px;">&copy; 2025 BlogPlatform. All rights reserved.</div>
</div>"#
    )
}

fn code_block(code: &str) -> String {
    format!(
        r#"<div style="font-size:32px;letter-spacing:8px;font-weight:bold;text-align:center;margin:25px 0;">{code}</div>"#
    )
}

/// Sent once at registration: greeting plus the first verification code.
pub fn welcome_email(user_name: &str, otp_code: &str, ttl_minutes: i64) -> String {
    let inner = format!(
        r#"<p style="font-size:16px;line-height:1.5;">Thanks for signing up to BlogPlatform. We're excited to have you onboard.</p>
  <p style="font-size:16px;line-height:1.5;">Confirm your email address with the verification code below. It expires in {ttl_minutes} minutes.</p>
  {code}
  <p style="font-size:16px;line-height:1.5;">Once verified you can start creating and sharing blog posts, managing your content, and connecting with others.</p>"#,
        code = code_block(otp_code),
    );
    layout(&format!("Welcome, {user_name}!"), &inner)
}

/// Sent on OTP reissue.
pub fn otp_email(user_name: &str, otp_code: &str, ttl_minutes: i64) -> String {
    let inner = format!(
        r#"<p style="font-size:16px;line-height:1.5;">Here is your new verification code. It expires in {ttl_minutes} minutes.</p>
  {code}
  <p style="font-size:16px;line-height:1.5;">If you did not request a new code, you can safely ignore this email.</p>"#,
        code = code_block(otp_code),
    );
    layout(&format!("Hello, {user_name}!"), &inner)
}

/// Sent when a password reset is requested.
pub fn reset_email(user_name: &str, token: &str, ttl_minutes: i64) -> String {
    let inner = format!(
        r#"<p style="font-size:16px;line-height:1.5;">A password reset was requested for your BlogPlatform account.</p>
  <p style="font-size:16px;line-height:1.5;">Use the code below to set a new password. It expires in {ttl_minutes} minutes.</p>
  {code}
  <p style="font-size:16px;line-height:1.5;">If you did not request this reset, please ignore this email and make sure your account is secure.</p>"#,
        code = code_block(token),
    );
    layout(&format!("Hello, {user_name}!"), &inner)
}
