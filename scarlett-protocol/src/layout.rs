//! Known fields of the software configuration area
//!
//! Only used to label change ranges; the shadow itself stays an opaque byte
//! region.

/// Start of the software configuration area in device memory
pub const SW_CONFIG_BASE: usize = 0xec;

/// Matrix mixer geometry inside the software configuration
pub const SW_CONFIG_MIXER_INPUTS: usize = 30;
pub const SW_CONFIG_MIXER_OUTPUTS: usize = 12;

/// A named (possibly repeated) field of the software configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Absolute device memory address
    pub address: usize,
    /// Size of one element
    pub element: usize,
    pub count: usize,
}

impl Field {
    const fn new(name: &'static str, offset: usize, element: usize, count: usize) -> Self {
        Self {
            name,
            address: SW_CONFIG_BASE + offset,
            element,
            count,
        }
    }

    pub fn end(&self) -> usize {
        self.address + self.element * self.count
    }

    pub fn contains(&self, address: usize) -> bool {
        (self.address..self.end()).contains(&address)
    }
}

pub const SW_CONFIG_FIELDS: &[Field] = &[
    Field::new("sw.all_size", 0x0000, 2, 1),
    Field::new("sw.magic", 0x0002, 2, 1),
    Field::new("sw.version", 0x0004, 4, 1),
    Field::new("sw.size", 0x0008, 2, 1),
    Field::new("sw.stereo", 0x00c8, 4, 1),
    Field::new("sw.mute", 0x00cc, 4, 1),
    Field::new("sw.volume", 0x00d0, 4, 10),
    Field::new("sw.in_alias", 0x02d4, 12, 8),
    Field::new("sw.out_alias", 0x0904, 12, 26),
    Field::new(
        "sw.mixer",
        0x0ff0,
        4,
        SW_CONFIG_MIXER_OUTPUTS * SW_CONFIG_MIXER_INPUTS,
    ),
    Field::new("sw.checksum", 0x1980, 4, 1),
];

/// Field containing `address`, if any
pub fn field_at(address: usize) -> Option<&'static Field> {
    SW_CONFIG_FIELDS.iter().find(|f| f.contains(address))
}

/// Human-readable label for `address`, e.g. `sw.volume[3]` or `sw.mixer[1][4]+2`
pub fn describe(address: usize) -> Option<String> {
    let field = field_at(address)?;
    let rel = address - field.address;
    let index = rel / field.element;
    let byte = rel % field.element;

    let mut label = if field.count == 1 {
        field.name.to_string()
    } else if field.name == "sw.mixer" {
        format!(
            "{}[{}][{}]",
            field.name,
            index / SW_CONFIG_MIXER_INPUTS,
            index % SW_CONFIG_MIXER_INPUTS
        )
    } else {
        format!("{}[{}]", field.name, index)
    };

    if byte != 0 {
        label.push_str(&format!("+{}", byte));
    }
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_addresses() {
        let addr = |name| field_at_name(name).address;
        assert_eq!(addr("sw.stereo"), 0x1b4);
        assert_eq!(addr("sw.volume"), 0x1bc);
        assert_eq!(addr("sw.in_alias"), 0x3c0);
        assert_eq!(addr("sw.out_alias"), 0x9f0);
        assert_eq!(addr("sw.mixer"), 0x10dc);
        assert_eq!(addr("sw.checksum"), 0x1a6c);
        assert_eq!(field_at_name("sw.mixer").end(), 0x167c);
    }

    fn field_at_name(name: &str) -> &'static Field {
        SW_CONFIG_FIELDS.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(0xec).as_deref(), Some("sw.all_size"));
        assert_eq!(describe(0x1bc + 3 * 4).as_deref(), Some("sw.volume[3]"));
        assert_eq!(describe(0x1bc + 3 * 4 + 2).as_deref(), Some("sw.volume[3]+2"));
        assert_eq!(
            describe(0x10dc + (30 + 4) * 4).as_deref(),
            Some("sw.mixer[1][4]")
        );
        assert_eq!(describe(0x10), None);
        assert_eq!(describe(0x1e4), None);
    }
}
