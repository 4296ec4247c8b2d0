//! Attribute registry: the handle space of the GATT server.
//!
//! Services are declared statically as [`ServiceDecl`] tables.  At boot
//! each table is handed to the host stack, which returns the handle of
//! the service declaration; the remaining handles follow contiguously in
//! declaration order (the layout every supported stack uses):
//!
//! ```text
//! base + 0   service declaration (0x2800)
//! base + 1   characteristic declaration (0x2803)
//! base + 2     characteristic value
//! base + 3       descriptor …
//! base + n   next characteristic declaration …
//! ```
//!
//! After registration the table is sealed and never changes; lookups are
//! a single hash-map probe keyed by handle.

use core::fmt;

use heapless::FnvIndexMap;

use crate::error::{AttError, RegistryError};

/// Upper bound on registered attributes (power of two for `FnvIndexMap`).
pub const MAX_ATTRIBUTES: usize = 64;

// ───────────────────────────────────────────────────────────────
// Capabilities
// ───────────────────────────────────────────────────────────────

/// Operations an attribute permits, plus profile requirements.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Caps(u8);

impl Caps {
    pub const READ: Self = Self(0x01);
    pub const WRITE: Self = Self(0x02);
    pub const WRITE_NO_RSP: Self = Self(0x04);
    pub const NOTIFY: Self = Self(0x08);
    pub const INDICATE: Self = Self(0x10);
    /// Notifications/indications need an encrypted link.
    pub const ENCRYPTED: Self = Self(0x20);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub const fn writable(self) -> bool {
        self.0 & (Self::WRITE.0 | Self::WRITE_NO_RSP.0) != 0
    }

    pub const fn notifiable(self) -> bool {
        self.0 & (Self::NOTIFY.0 | Self::INDICATE.0) != 0
    }
}

impl fmt::Debug for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Caps, &str); 6] = [
            (Caps::READ, "R"),
            (Caps::WRITE, "W"),
            (Caps::WRITE_NO_RSP, "Wnr"),
            (Caps::NOTIFY, "N"),
            (Caps::INDICATE, "I"),
            (Caps::ENCRYPTED, "Enc"),
        ];
        let mut first = true;
        for (cap, name) in NAMES {
            if self.contains(cap) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Attribute identity
// ───────────────────────────────────────────────────────────────

/// Identity of every value-bearing attribute this server exposes.
///
/// Used as the index into the dispatcher's handler table and into the
/// registry's handle cache, so the discriminants must stay dense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttrKey {
    ManufacturerName = 0,
    PnpId = 1,
    BatteryLevel = 2,
    BatteryLevelCccd = 3,
    BatteryLevelFormat = 4,
    HidInformation = 5,
    ReportMap = 6,
    HidControlPoint = 7,
    InputReport = 8,
    InputReportReference = 9,
    InputReportCccd = 10,
    OutputReport = 11,
    OutputReportReference = 12,
    ProtocolMode = 13,
}

impl AttrKey {
    pub const COUNT: usize = 14;
}

// ───────────────────────────────────────────────────────────────
// Static declarations
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DescDecl {
    pub uuid: u16,
    pub key: AttrKey,
    pub caps: Caps,
}

#[derive(Debug)]
pub struct CharDecl {
    pub uuid: u16,
    pub key: AttrKey,
    pub caps: Caps,
    pub descriptors: &'static [DescDecl],
}

#[derive(Debug)]
pub struct ServiceDecl {
    pub uuid: u16,
    pub characteristics: &'static [CharDecl],
}

impl ServiceDecl {
    /// Number of handles this service occupies.
    pub fn attribute_count(&self) -> usize {
        1 + self
            .characteristics
            .iter()
            .map(|c| 2 + c.descriptors.len())
            .sum::<usize>()
    }
}

// ───────────────────────────────────────────────────────────────
// Registered attributes
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    ServiceDeclaration,
    CharacteristicDeclaration,
    Value,
    Descriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub handle: u16,
    pub service: u16,
    pub uuid: u16,
    pub kind: AttrKind,
    pub caps: Caps,
    /// `None` for declarations, which the stack serves itself.
    pub key: Option<AttrKey>,
    /// Value handle of the owning characteristic (self for values).
    pub value_handle: u16,
}

pub struct Registry {
    attrs: FnvIndexMap<u16, Attribute, MAX_ATTRIBUTES>,
    by_key: [Option<u16>; AttrKey::COUNT],
    sealed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            attrs: FnvIndexMap::new(),
            by_key: [None; AttrKey::COUNT],
            sealed: false,
        }
    }

    /// Lay out `decl` starting at `base` (the handle the stack assigned
    /// to the service declaration).
    ///
    /// Either every attribute of the service is inserted or none is.
    pub fn register(&mut self, decl: &'static ServiceDecl, base: u16) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed);
        }
        let count = decl.attribute_count();
        if self.attrs.len() + count > MAX_ATTRIBUTES {
            return Err(RegistryError::Full);
        }
        let last = usize::from(base) + count - 1;
        if base == 0 || last > usize::from(u16::MAX) {
            return Err(RegistryError::HandleCollision(base));
        }
        if let Some(h) = (base..=last as u16).find(|h| self.attrs.contains_key(h)) {
            return Err(RegistryError::HandleCollision(h));
        }

        let mut handle = base;
        self.insert(Attribute {
            handle,
            service: decl.uuid,
            uuid: crate::gatt::uuids::PRIMARY_SERVICE,
            kind: AttrKind::ServiceDeclaration,
            caps: Caps::READ,
            key: None,
            value_handle: 0,
        })?;

        for chr in decl.characteristics {
            handle += 1;
            let value_handle = handle + 1;
            self.insert(Attribute {
                handle,
                service: decl.uuid,
                uuid: crate::gatt::uuids::CHARACTERISTIC,
                kind: AttrKind::CharacteristicDeclaration,
                caps: Caps::READ,
                key: None,
                value_handle,
            })?;

            handle += 1;
            self.insert(Attribute {
                handle,
                service: decl.uuid,
                uuid: chr.uuid,
                kind: AttrKind::Value,
                caps: chr.caps,
                key: Some(chr.key),
                value_handle,
            })?;
            self.by_key[chr.key as usize] = Some(handle);

            for dsc in chr.descriptors {
                handle += 1;
                self.insert(Attribute {
                    handle,
                    service: decl.uuid,
                    uuid: dsc.uuid,
                    kind: AttrKind::Descriptor,
                    caps: dsc.caps,
                    key: Some(dsc.key),
                    value_handle,
                })?;
                self.by_key[dsc.key as usize] = Some(handle);
            }
        }

        log::info!(
            "GATT: service 0x{:04X} registered at handles {}..={}",
            decl.uuid,
            base,
            handle
        );
        Ok(())
    }

    /// Freeze the handle space.  Further `register` calls fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn lookup(&self, handle: u16) -> Result<&Attribute, AttError> {
        self.attrs.get(&handle).ok_or(AttError::NotFound)
    }

    /// Cached handle of a value or descriptor, by identity.
    pub fn handle_of(&self, key: AttrKey) -> Option<u16> {
        self.by_key[key as usize]
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.values()
    }

    fn insert(&mut self, attr: Attribute) -> Result<(), RegistryError> {
        self.attrs
            .insert(attr.handle, attr)
            .map(|_| ())
            .map_err(|_| RegistryError::Full)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
