use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Template category; decides which secondary format a template emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Social,
    Web,
    Logo,
    Ads,
    Email,
    Print,
    #[serde(other)]
    Other,
}

impl TemplateCategory {
    /// Web and logo targets keep transparency when the source has it
    pub fn preserves_transparency(self) -> bool {
        matches!(self, TemplateCategory::Web | TemplateCategory::Logo)
    }
}

/// Target height: fixed, or derived from the width for resize-only targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HeightRepr", into = "HeightRepr")]
pub enum TemplateHeight {
    Fixed(u32),
    Auto,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum HeightRepr {
    Pixels(u32),
    Keyword(String),
}

impl TryFrom<HeightRepr> for TemplateHeight {
    type Error = String;

    fn try_from(repr: HeightRepr) -> Result<Self, Self::Error> {
        match repr {
            HeightRepr::Pixels(0) => Err("template height must be positive".to_string()),
            HeightRepr::Pixels(h) => Ok(TemplateHeight::Fixed(h)),
            HeightRepr::Keyword(k) if k.eq_ignore_ascii_case("auto") => Ok(TemplateHeight::Auto),
            HeightRepr::Keyword(k) => Err(format!("invalid template height: {}", k)),
        }
    }
}

impl From<TemplateHeight> for HeightRepr {
    fn from(height: TemplateHeight) -> Self {
        match height {
            TemplateHeight::Fixed(h) => HeightRepr::Pixels(h),
            TemplateHeight::Auto => HeightRepr::Keyword("auto".to_string()),
        }
    }
}

/// One platform-specific target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub category: TemplateCategory,
    pub width: u32,
    pub height: TemplateHeight,
}

impl TemplateSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        platform: impl Into<String>,
        category: TemplateCategory,
        width: u32,
        height: TemplateHeight,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            platform: platform.into(),
            category,
            width,
            height,
        }
    }

    pub fn is_resize_only(&self) -> bool {
        self.height == TemplateHeight::Auto
    }

    /// Grouping key: specs sharing a key share one computed transform
    pub fn group_key(&self) -> String {
        match self.height {
            TemplateHeight::Auto => format!("auto_{}", self.width),
            TemplateHeight::Fixed(h) => format!("{}x{}", self.width, h),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 {
            return Err(EngineError::InvalidInput(format!(
                "template '{}' has zero width",
                self.id
            )));
        }
        if self.id.trim().is_empty() || self.platform.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "template id and platform are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in catalog of common platform targets
    pub fn default_catalog() -> Vec<TemplateSpec> {
        use TemplateCategory::*;
        use TemplateHeight::{Auto, Fixed};

        vec![
            Self::new("instagram-square", "square-post", "instagram", Social, 1080, Fixed(1080)),
            Self::new("instagram-portrait", "portrait-post", "instagram", Social, 1080, Fixed(1350)),
            Self::new("instagram-story", "story", "instagram", Social, 1080, Fixed(1920)),
            Self::new("facebook-post", "post", "facebook", Social, 1200, Fixed(630)),
            Self::new("facebook-cover", "cover", "facebook", Social, 820, Fixed(312)),
            Self::new("x-post", "post", "x", Social, 1600, Fixed(900)),
            Self::new("x-header", "header", "x", Social, 1500, Fixed(500)),
            Self::new("linkedin-post", "post", "linkedin", Social, 1200, Fixed(627)),
            Self::new("linkedin-banner", "banner", "linkedin", Social, 1584, Fixed(396)),
            Self::new("youtube-thumbnail", "thumbnail", "youtube", Social, 1280, Fixed(720)),
            Self::new("pinterest-pin", "pin", "pinterest", Social, 1000, Fixed(1500)),
            Self::new("web-hero", "hero", "web", Web, 1920, Auto),
            Self::new("web-blog", "blog", "web", Web, 1200, Auto),
            Self::new("web-og", "open-graph", "web", Web, 1200, Fixed(630)),
            Self::new("web-thumbnail", "thumbnail", "web", Web, 400, Fixed(400)),
            Self::new("logo-favicon", "favicon", "logo", Logo, 32, Fixed(32)),
            Self::new("logo-touch-icon", "touch-icon", "logo", Logo, 180, Fixed(180)),
            Self::new("logo-square", "square", "logo", Logo, 512, Fixed(512)),
            Self::new("email-header", "header", "email", Email, 600, Auto),
            Self::new("ads-rectangle", "medium-rectangle", "ads", Ads, 300, Fixed(250)),
            Self::new("ads-leaderboard", "leaderboard", "ads", Ads, 728, Fixed(90)),
        ]
    }

    /// Parse a catalog from JSON
    pub fn catalog_from_json(json: &str) -> Result<Vec<TemplateSpec>, EngineError> {
        let specs: Vec<TemplateSpec> = serde_json::from_str(json)?;
        for spec in &specs {
            spec.validate()?;
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_keys() {
        let auto = TemplateSpec::new("a", "blog", "web", TemplateCategory::Web, 1200, TemplateHeight::Auto);
        let fixed = TemplateSpec::new("b", "og", "web", TemplateCategory::Web, 1200, TemplateHeight::Fixed(630));
        assert_eq!(auto.group_key(), "auto_1200");
        assert_eq!(fixed.group_key(), "1200x630");
        assert!(auto.is_resize_only());
        assert!(!fixed.is_resize_only());
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"[
            {"id": "hero", "name": "hero", "platform": "web", "category": "web", "width": 1920, "height": "auto"},
            {"id": "sq", "name": "square", "platform": "instagram", "category": "social", "width": 1080, "height": 1080},
            {"id": "misc", "name": "misc", "platform": "other", "category": "billboard", "width": 10, "height": 10}
        ]"#;
        let specs = TemplateSpec::catalog_from_json(json).unwrap();
        assert_eq!(specs[0].height, TemplateHeight::Auto);
        assert_eq!(specs[1].height, TemplateHeight::Fixed(1080));
        assert_eq!(specs[2].category, TemplateCategory::Other);
    }

    #[test]
    fn test_catalog_rejects_bad_height() {
        let json = r#"[{"id": "x", "name": "x", "platform": "web", "category": "web", "width": 10, "height": "tall"}]"#;
        assert!(TemplateSpec::catalog_from_json(json).is_err());
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = TemplateSpec::default_catalog();
        assert!(catalog.iter().all(|spec| spec.validate().is_ok()));
        let ids: std::collections::HashSet<_> = catalog.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
    }
}
