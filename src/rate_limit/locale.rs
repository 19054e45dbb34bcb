//! Accessible status messages
//!
//! Two fixed locales; screen readers announce these strings verbatim, so
//! they are short complete sentences without symbols.

use serde::{Deserialize, Serialize};

/// Language of user-facing status strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Hindi,
}

impl Locale {
    /// `true` selects Hindi, `false` the default language
    pub fn from_hindi_flag(is_hindi: bool) -> Self {
        if is_hindi {
            Locale::Hindi
        } else {
            Locale::English
        }
    }

    /// Message for an endpoint that can accept a request now
    pub fn ready_message(&self) -> String {
        match self {
            Locale::English => "Ready to send request".to_string(),
            Locale::Hindi => "अनुरोध भेजने के लिए तैयार".to_string(),
        }
    }

    /// Message asking the user to wait `seconds`
    pub fn wait_message(&self, seconds: u64) -> String {
        match self {
            Locale::English if seconds == 1 => "Please wait 1 second".to_string(),
            Locale::English => format!("Please wait {} seconds", seconds),
            Locale::Hindi => format!("कृपया {} सेकंड प्रतीक्षा करें", seconds),
        }
    }

    /// Pick the ready or wait message for an estimated wait
    pub fn status_message(&self, wait_secs: u64) -> String {
        if wait_secs == 0 {
            self.ready_message()
        } else {
            self.wait_message(wait_secs)
        }
    }
}
