//! Pure click classification helpers used by analytics consumers.

use url::Url;

/// Coarse device class derived from a User-Agent header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Bot,
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
            Self::Unknown => "unknown",
        }
    }
}

/// Classifies a User-Agent string.
///
/// Bot markers win over device markers; tablets are checked before phones
/// because iPad and Android tablet agents also contain "Mobile" in some builds.
pub fn classify_device(user_agent: Option<&str>) -> DeviceClass {
    let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
        return DeviceClass::Unknown;
    };
    let ua = ua.to_ascii_lowercase();

    const BOT_MARKERS: [&str; 5] = ["bot", "crawler", "spider", "curl/", "wget/"];
    if BOT_MARKERS.iter().any(|m| ua.contains(m)) {
        return DeviceClass::Bot;
    }

    if ua.contains("ipad") || ua.contains("tablet") {
        return DeviceClass::Tablet;
    }

    if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
        return DeviceClass::Mobile;
    }

    if ua.contains("windows") || ua.contains("macintosh") || ua.contains("x11") {
        return DeviceClass::Desktop;
    }

    DeviceClass::Unknown
}

/// Extracts the lowercase host of a Referer header, without a leading `www.`.
///
/// Returns `None` for missing, relative, or non-HTTP referrers.
pub fn referrer_host(referer: Option<&str>) -> Option<String> {
    let url = Url::parse(referer?.trim()).ok()?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
