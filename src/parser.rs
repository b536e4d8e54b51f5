//! Goblin-based PE32 image reader.

use goblin::pe::PE;

use crate::{Addr, LiftError};

/// Section characteristics flag marking a section as containing code.
pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;

/// One section of a PE image, with its raw contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Virtual address of the section, relative to the image base
    pub virtual_address: Addr,
    /// Raw section contents
    pub data: Vec<u8>,
    /// Whether the section contains executable code
    pub executable: bool,
}

impl Section {
    /// Reports whether the section characteristics include the code flag.
    fn is_exec(characteristics: u32) -> bool {
        characteristics & IMAGE_SCN_CNT_CODE != 0
    }
}

/// A parsed 32-bit PE image.
#[derive(Debug, Clone)]
pub struct PeImage {
    /// Image base from the optional header
    pub base: Addr,
    /// All sections of the image, in file order
    pub sections: Vec<Section>,
}

impl PeImage {
    /// Parse a PE32 image from raw file contents.
    ///
    /// PE32+ (64-bit) images are rejected.
    pub fn parse(data: &[u8]) -> Result<Self, LiftError> {
        let pe = PE::parse(data).map_err(|err| LiftError::PeOpen(err.to_string()))?;
        if pe.is_64 {
            return Err(LiftError::UnsupportedArch);
        }
        if pe.header.optional_header.is_none() {
            return Err(LiftError::PeOpen("missing optional header".to_string()));
        }

        let mut sections = Vec::with_capacity(pe.sections.len());
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("").to_string();
            let start = sect.pointer_to_raw_data as usize;
            let size = sect.size_of_raw_data as usize;
            let raw = data
                .get(start..start + size)
                .ok_or_else(|| LiftError::SectionRead(name.clone()))?;
            sections.push(Section {
                name,
                virtual_address: Addr::new(sect.virtual_address),
                data: raw.to_vec(),
                executable: Section::is_exec(sect.characteristics),
            });
        }

        Ok(PeImage {
            base: Addr::new(pe.image_base as u32),
            sections,
        })
    }

    /// Iterate the executable sections of the image.
    pub fn executable_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.executable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_flag_mask() {
        assert!(Section::is_exec(0x6000_0020));
        assert!(Section::is_exec(IMAGE_SCN_CNT_CODE));
        // Execute permission alone does not mark a code section.
        assert!(!Section::is_exec(0x2000_0000));
        assert!(!Section::is_exec(0));
    }

    #[test]
    fn test_reject_non_pe() {
        let err = PeImage::parse(b"\x7fELF not a pe image").unwrap_err();
        assert!(matches!(err, LiftError::PeOpen(_)));
    }

    #[test]
    fn test_reject_empty() {
        assert!(PeImage::parse(&[]).is_err());
    }
}
