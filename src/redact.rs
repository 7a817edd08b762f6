//! Masking of personal data before it reaches the logs.

/// `john.smith@gmail.com` → `jo***@gmail.com`.
pub fn email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let prefix: String = local.chars().take(2).collect();
            format!("{prefix}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// `John Smith` → `Jo*** Sm***`. Tokens of two characters or fewer are kept.
pub fn name(name: &str) -> String {
    name.split(' ')
        .map(|part| {
            if part.chars().count() > 2 {
                let prefix: String = part.chars().take(2).collect();
                format!("{prefix}***")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
