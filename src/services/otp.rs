//! One-time code generation and the reset email built around it.

use rand::Rng;

use crate::services::mailer::OutgoingMail;

/// Generates a numeric code of exactly `length` digits, zero-padded.
///
/// Draws from the thread-local CSPRNG (ChaCha seeded from the OS), so codes
/// are not predictable from earlier ones.
#[must_use]
pub fn generate_code(length: usize) -> String {
    let length = length.clamp(1, 18);
    let upper = 10u64.pow(u32::try_from(length).unwrap_or(18));
    let value = rand::rng().random_range(0..upper);
    format!("{value:0length$}")
}

/// Whether `code` looks like something [`generate_code`] could have produced.
#[must_use]
pub fn is_well_formed(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| b.is_ascii_digit())
}

/// Builds the message carrying a reset code to `to`.
#[must_use]
pub fn reset_mail(to: &str, code: &str, expiry_minutes: i64) -> OutgoingMail {
    let subject = "Your password reset code".to_string();

    let body_text = format!(
        "We received a request to reset your SchoolHub password.\n\
         \n\
         Your one-time code is: {code}\n\
         \n\
         The code expires in {expiry_minutes} minutes and can be used once.\n\
         If you did not request a reset you can ignore this message."
    );

    let body_html = format!(
        "<p>We received a request to reset your SchoolHub password.</p>\
         <p>Your one-time code is: <strong style=\"font-size:1.4em;letter-spacing:0.2em\">{code}</strong></p>\
         <p>The code expires in {expiry_minutes} minutes and can be used once.</p>\
         <p>If you did not request a reset you can ignore this message.</p>"
    );

    OutgoingMail {
        to: to.to_string(),
        subject,
        body_html,
        body_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_requested_length() {
        for length in [4, 6, 8, 10] {
            for _ in 0..200 {
                let code = generate_code(length);
                assert!(is_well_formed(&code, length), "bad code {code}");
            }
        }
    }

    #[test]
    fn codes_vary() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_code(6)).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn well_formed_rejects_letters_and_wrong_length() {
        assert!(is_well_formed("012345", 6));
        assert!(!is_well_formed("01234", 6));
        assert!(!is_well_formed("01234a", 6));
        assert!(!is_well_formed("", 6));
    }

    #[test]
    fn reset_mail_embeds_code_and_expiry() {
        let mail = reset_mail("a@b.com", "004211", 15);
        assert_eq!(mail.to, "a@b.com");
        assert!(mail.body_text.contains("004211"));
        assert!(mail.body_text.contains("15 minutes"));
        assert!(mail.body_html.contains("004211"));
        assert!(mail.body_html.contains("15 minutes"));
    }
}
