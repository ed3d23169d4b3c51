use crate::common::TagClass;

/// One decoded BER element, ready for matching or re-serialization.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StructureTag {
    pub class: TagClass,
    pub id: u64,
    pub payload: PL,
}

/// Element payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PL {
    /// Primitive: raw value octets.
    P(Vec<u8>),
    /// Constructed: nested elements.
    C(Vec<StructureTag>),
}

impl StructureTag {
    pub fn match_class(self, class: TagClass) -> Option<Self> {
        if self.class == class {
            Some(self)
        } else {
            None
        }
    }

    pub fn match_id(self, id: u64) -> Option<Self> {
        if self.id == id {
            Some(self)
        } else {
            None
        }
    }

    pub fn expect_constructed(self) -> Option<Vec<StructureTag>> {
        match self.payload {
            PL::P(_) => None,
            PL::C(i) => Some(i),
        }
    }

    pub fn expect_primitive(self) -> Option<Vec<u8>> {
        match self.payload {
            PL::P(i) => Some(i),
            PL::C(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StructureTag {
        StructureTag {
            class: TagClass::Application,
            id: 65,
            payload: PL::C(vec![
                StructureTag {
                    class: TagClass::Universal,
                    id: 2,
                    payload: PL::P(vec![0x16, 0x16]),
                },
                StructureTag {
                    class: TagClass::Application,
                    id: 3,
                    payload: PL::P(vec![0x3, 0x3]),
                },
            ]),
        }
    }

    #[test]
    fn match_chain() {
        let tag = sample();
        let out = tag
            .clone()
            .match_class(TagClass::Application)
            .and_then(|x| x.match_id(65));
        assert_eq!(out, Some(tag));
        assert_eq!(sample().match_class(TagClass::Context), None);
        assert_eq!(sample().match_id(66), None);
    }

    #[test]
    fn expect_payload_kind() {
        let inner = sample().expect_constructed().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].clone().expect_primitive(), Some(vec![0x16, 0x16]));
        assert_eq!(inner[1].clone().expect_constructed(), None);
    }
}
