//! In-memory box tree and the lookup interface fragment extraction reads through.

use super::{Atom, AtomType};

/// Nesting deeper than this is treated as corrupt and not descended into.
const MAX_DEPTH: usize = 16;

/// A located box and its payload bytes (after the header).
#[derive(Debug, Clone, Copy)]
pub struct BoxView<'a> {
    pub atom: Atom,
    pub payload: &'a [u8],
}

impl BoxView<'_> {
    /// Offset of the box header within the parsed buffer.
    pub fn offset(&self) -> usize {
        self.atom.offset
    }
}

/// Named-box lookup over a parsed buffer.
///
/// Lookups search the whole tree in pre-order, so `get_box` returns the
/// first box of the type in file order.
pub trait BoxLookup {
    /// First box of the given type, if any.
    fn get_box(&self, atom_type: AtomType) -> Option<BoxView<'_>>;

    /// All boxes of the given type, in file order.
    fn get_boxes(&self, atom_type: AtomType) -> Vec<BoxView<'_>>;
}

/// Flattened box tree over a borrowed buffer.
#[derive(Debug)]
pub struct IsoFile<'a> {
    data: &'a [u8],
    atoms: Vec<Atom>,
}

impl<'a> IsoFile<'a> {
    /// Walk the buffer and index every box, descending into containers.
    ///
    /// Walking stops at the first header that does not fit the remaining
    /// bytes of its parent; everything indexed so far stays available.
    pub fn parse(data: &'a [u8]) -> Self {
        let mut atoms = Vec::new();
        read_atoms(data, 0, data.len(), 0, &mut atoms);
        Self { data, atoms }
    }

    /// All indexed atoms in pre-order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// The underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn view(&self, atom: &Atom) -> BoxView<'_> {
        BoxView {
            atom: *atom,
            payload: &self.data[atom.data_offset()..atom.end()],
        }
    }
}

impl BoxLookup for IsoFile<'_> {
    fn get_box(&self, atom_type: AtomType) -> Option<BoxView<'_>> {
        self.atoms
            .iter()
            .find(|a| a.atom_type == atom_type)
            .map(|a| self.view(a))
    }

    fn get_boxes(&self, atom_type: AtomType) -> Vec<BoxView<'_>> {
        self.atoms
            .iter()
            .filter(|a| a.atom_type == atom_type)
            .map(|a| self.view(a))
            .collect()
    }
}

fn read_atoms(data: &[u8], start: usize, end: usize, depth: usize, out: &mut Vec<Atom>) {
    let mut pos = start;

    while pos + 8 <= end {
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let atom_type =
            AtomType::from_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);

        let (actual_size, header_size) = match size {
            // 64-bit extended size
            1 => {
                if pos + 16 > end {
                    break;
                }
                let mut ext = [0u8; 8];
                ext.copy_from_slice(&data[pos + 8..pos + 16]);
                match usize::try_from(u64::from_be_bytes(ext)) {
                    Ok(s) => (s, 16u8),
                    Err(_) => break,
                }
            }
            // Atom extends to end of parent
            0 => (end - pos, 8u8),
            s => (s as usize, 8u8),
        };

        if actual_size < header_size as usize || actual_size > end - pos {
            tracing::debug!(
                "Stopping box walk at {}: {} declares {} bytes, {} left",
                pos,
                atom_type,
                actual_size,
                end - pos
            );
            break;
        }

        let atom = Atom {
            atom_type,
            offset: pos,
            size: actual_size,
            header_size,
        };
        out.push(atom);

        if atom_type.is_container() && depth < MAX_DEPTH {
            read_atoms(data, atom.data_offset(), atom.end(), depth + 1, out);
        }

        pos += actual_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(name);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_nested_lookup() {
        let tfdt = make_box(b"tfdt", &[0, 0, 0, 0, 0, 0, 0, 9]);
        let traf = make_box(b"traf", &tfdt);
        let mut data = make_box(b"moof", &traf);
        data.extend(make_box(b"mdat", &[1, 2, 3]));

        let file = IsoFile::parse(&data);
        assert_eq!(file.atoms().len(), 4);

        let tfdt = file.get_box(AtomType::TFDT).unwrap();
        assert_eq!(tfdt.offset(), 16);
        assert_eq!(tfdt.payload, &[0, 0, 0, 0, 0, 0, 0, 9]);

        let mdat = file.get_box(AtomType::MDAT).unwrap();
        assert_eq!(mdat.payload, &[1, 2, 3]);
    }

    #[test]
    fn test_get_boxes_in_order() {
        let mut traf = make_box(b"trun", &[1]);
        traf.extend(make_box(b"trun", &[2]));
        let data = make_box(b"traf", &traf);

        let file = IsoFile::parse(&data);
        let truns = file.get_boxes(AtomType::TRUN);
        assert_eq!(truns.len(), 2);
        assert_eq!(truns[0].payload, &[1]);
        assert_eq!(truns[1].payload, &[2]);
    }

    #[test]
    fn test_oversized_box_stops_walk() {
        let mut data = make_box(b"free", &[0; 4]);
        // Declares 100 bytes but only 12 follow.
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"moof");
        data.extend_from_slice(&[0; 4]);

        let file = IsoFile::parse(&data);
        assert_eq!(file.atoms().len(), 1);
        assert!(file.get_box(AtomType::MOOF).is_none());
    }

    #[test]
    fn test_extended_size() {
        let mut data = 1u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[7, 7, 7, 7]);

        let file = IsoFile::parse(&data);
        let mdat = file.get_box(AtomType::MDAT).unwrap();
        assert_eq!(mdat.atom.header_size, 16);
        assert_eq!(mdat.payload, &[7, 7, 7, 7]);
    }

    #[test]
    fn test_empty_buffer() {
        let file = IsoFile::parse(&[]);
        assert!(file.atoms().is_empty());
        assert!(file.get_boxes(AtomType::TRUN).is_empty());
    }
}
