use clap::ValueEnum;

/// A product category and the encyclopedia pages that describe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    /// Main article first, then the per-generation articles.
    pub pages: &'static [&'static str],
}

/// Number of generation pages fetched in [`ExtractionMode::Main`].
const MAIN_MODE_GENERATIONS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExtractionMode {
    /// Every configured page of each category.
    Comprehensive,
    /// The main article plus the first three generations.
    #[default]
    Main,
}

impl Category {
    pub fn titles(&self, mode: ExtractionMode) -> &'static [&'static str] {
        match mode {
            ExtractionMode::Comprehensive => self.pages,
            ExtractionMode::Main => {
                let end = (1 + MAIN_MODE_GENERATIONS).min(self.pages.len());
                &self.pages[..end]
            }
        }
    }
}

pub fn find_category(name: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.name == name)
}

pub const CATEGORIES: [Category; 4] = [
    Category {
        name: "ipad_general",
        pages: &[
            "iPad",
            "iPad (1st generation)",
            "iPad (2nd generation)",
            "iPad (3rd generation)",
            "iPad (4th generation)",
            "iPad (5th generation)",
            "iPad (6th generation)",
            "iPad (7th generation)",
            "iPad (8th generation)",
            "iPad (9th generation)",
            "iPad (10th generation)",
            "iPad (11th generation)",
        ],
    },
    Category {
        name: "ipad_pro",
        pages: &[
            "iPad Pro",
            "iPad Pro (1st generation)",
            "iPad Pro (2nd generation)",
            "iPad Pro (3rd generation)",
            "iPad Pro (4th generation)",
            "iPad Pro (5th generation)",
            "iPad Pro (6th generation)",
            "iPad Pro (7th generation)",
        ],
    },
    Category {
        name: "ipad_air",
        pages: &[
            "iPad Air",
            "iPad Air (1st generation)",
            "iPad Air (2nd generation)",
            "iPad Air (3rd generation)",
            "iPad Air (4th generation)",
            "iPad Air (5th generation)",
            "iPad Air (6th generation)",
            "iPad Air (7th generation)",
        ],
    },
    Category {
        name: "ipad_mini",
        pages: &[
            "iPad Mini",
            "iPad Mini (1st generation)",
            "iPad Mini (2nd generation)",
            "iPad Mini (3rd generation)",
            "iPad Mini (4th generation)",
            "iPad Mini (5th generation)",
            "iPad Mini (6th generation)",
            "iPad Mini (7th generation)",
        ],
    },
];
