//! Database table configuration

/// Names of the tables owned by the engine, all sharing one prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableNames {
    pub sign_ins: String,
    pub account_metadata: String,
    pub sign_ins_per_ip: String,
}

impl TableNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            sign_ins: format!("{prefix}email_link_sign_ins"),
            account_metadata: format!("{prefix}account_metadata"),
            sign_ins_per_ip: format!("{prefix}sign_ins_per_ip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_use_prefix() {
        let tables = TableNames::with_prefix("el_");
        assert_eq!(tables.sign_ins, "el_email_link_sign_ins");
        assert_eq!(tables.account_metadata, "el_account_metadata");
        assert_eq!(tables.sign_ins_per_ip, "el_sign_ins_per_ip");
    }

    #[test]
    fn test_empty_prefix() {
        let tables = TableNames::with_prefix("");
        assert_eq!(tables.sign_ins, "email_link_sign_ins");
    }
}
