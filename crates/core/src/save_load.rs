//! `gc_save`/`gc_load`: serialise the transitive closure of a value to a
//! byte buffer and reconstruct it later, preserving sharing and cycles.
//!
//! Framing: a four-byte magic word, a four-byte big-endian length, then the
//! object graph. Each object becomes a record of a one-byte type tag, a
//! four-byte big-endian payload length, and the payload; references inside
//! a payload are recorded as four-byte offsets into the buffer.
//!
//! The *cell* encoding used inside a payload is a deliberate, documented
//! extension of that scheme (see `DESIGN.md`): a one-byte discriminator
//! (null / tagged-int / reference) followed by an 8-byte big-endian value,
//! of which only the reference variant's low four bytes are the
//! buffer-offset, which is what lets a 63-bit tagged integer round-trip
//! exactly while keeping every reference a four-byte offset.

use crate::header::TypeTag;
use crate::heap::{CodeHeader, Heap, CODE_PREFIX_SIZE};
use crate::value::Value;
use std::collections::{HashMap, HashSet, VecDeque};

pub const MAGIC: u32 = 0x871F_54AB;

const CELL_NULL: u8 = 0;
const CELL_INT: u8 = 1;
const CELL_REF: u8 = 2;
const CELL_SIZE: usize = 9;

const ROOT_NULL: u8 = 0;
const ROOT_INT: u8 = 1;
const ROOT_REF: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveLoadError {
    BadMagic,
    Truncated,
    CorruptTag(u8),
    DanglingReference(u32),
}

impl std::fmt::Display for SaveLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveLoadError::BadMagic => write!(f, "bad magic word"),
            SaveLoadError::Truncated => write!(f, "truncated snapshot"),
            SaveLoadError::CorruptTag(t) => write!(f, "unknown type tag {t} in snapshot"),
            SaveLoadError::DanglingReference(off) => {
                write!(f, "snapshot reference to unknown offset {off}")
            }
        }
    }
}
impl std::error::Error for SaveLoadError {}

fn write_cell(out: &mut Vec<u8>, v: Value, offsets: &HashMap<u32, u32>) {
    if v.is_null() {
        out.push(CELL_NULL);
        out.extend_from_slice(&[0u8; 8]);
    } else if v.is_int() {
        out.push(CELL_INT);
        out.extend_from_slice(&v.as_int().to_be_bytes());
    } else {
        out.push(CELL_REF);
        let target = offsets[&v.offset()];
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&target.to_be_bytes());
    }
}

fn read_cell(bytes: &[u8], loaded: &HashMap<u32, Value>) -> Result<Value, SaveLoadError> {
    if bytes.len() < CELL_SIZE {
        return Err(SaveLoadError::Truncated);
    }
    match bytes[0] {
        CELL_NULL => Ok(Value::NULL),
        CELL_INT => {
            let n = i64::from_be_bytes(bytes[1..9].try_into().unwrap());
            Ok(Value::make_int(n))
        }
        CELL_REF => {
            let off = u32::from_be_bytes(bytes[5..9].try_into().unwrap());
            loaded.get(&off).copied().ok_or(SaveLoadError::DanglingReference(off))
        }
        other => Err(SaveLoadError::CorruptTag(other)),
    }
}

fn record_payload_len(heap: &Heap, v: Value) -> usize {
    let tag = heap.tag(v);
    if tag == TypeTag::Code {
        CODE_PREFIX_SIZE + heap.code_nconsts(v) * CELL_SIZE + heap.code_bytecode(v).len()
    } else if tag.payload_is_raw_bytes() {
        heap.payload(v).len()
    } else {
        heap.cell_count(v) * CELL_SIZE
    }
}

fn children_of(heap: &Heap, v: Value) -> Vec<Value> {
    let tag = heap.tag(v);
    if tag == TypeTag::Code {
        (0..heap.code_nconsts(v)).map(|k| heap.code_const(v, k)).collect()
    } else if tag.payload_is_raw_bytes() {
        Vec::new()
    } else {
        (0..heap.cell_count(v)).map(|i| heap.get_cell(v, i)).collect()
    }
}

fn write_record(heap: &Heap, v: Value, offsets: &HashMap<u32, u32>, out: &mut Vec<u8>) {
    let tag = heap.tag(v);
    out.push(tag as u8);
    let mut payload = Vec::new();
    if tag == TypeTag::Code {
        let hdr = heap.code_header(v);
        let bytecode = heap.code_bytecode(v);
        let nconsts = heap.code_nconsts(v);
        payload.push(hdr.argc);
        payload.push(hdr.seclevel);
        payload.extend_from_slice(&hdr.nlocals.to_be_bytes());
        payload.extend_from_slice(&hdr.stack_depth.to_be_bytes());
        payload.extend_from_slice(&(nconsts as u16).to_be_bytes());
        payload.extend_from_slice(&(bytecode.len() as u32).to_be_bytes());
        for k in 0..nconsts {
            write_cell(&mut payload, heap.code_const(v, k), offsets);
        }
        payload.extend_from_slice(bytecode);
    } else if tag.payload_is_raw_bytes() {
        payload.extend_from_slice(heap.payload(v));
    } else {
        for i in 0..heap.cell_count(v) {
            write_cell(&mut payload, heap.get_cell(v, i), offsets);
        }
    }
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
}

/// Serialise the transitive closure reachable from `root`.
pub fn gc_save(heap: &Heap, root: Value) -> Vec<u8> {
    // Breadth-first discovery, assigning each reachable heap offset a byte
    // position in the eventual records stream. A parent is always assigned
    // a position before any of its children are discovered.
    let mut queue: VecDeque<u32> = VecDeque::new();
    let mut seen: HashSet<u32> = HashSet::new();
    let mut order: Vec<u32> = Vec::new();
    let mut offsets: HashMap<u32, u32> = HashMap::new();

    if root.is_ref() {
        seen.insert(root.offset());
        queue.push_back(root.offset());
    }

    let mut cursor: u32 = 8; // mirror the live heap's reserved low region
    while let Some(off) = queue.pop_front() {
        order.push(off);
        offsets.insert(off, cursor);
        let v = Value::from_offset(off);
        cursor += 1 + 4 + record_payload_len(heap, v) as u32; // tag + size + payload
        for child in children_of(heap, v) {
            if child.is_ref() && seen.insert(child.offset()) {
                queue.push_back(child.offset());
            }
        }
    }

    let mut out = Vec::new();
    if root.is_null() {
        out.push(ROOT_NULL);
        out.extend_from_slice(&[0u8; 8]);
    } else if root.is_int() {
        out.push(ROOT_INT);
        out.extend_from_slice(&root.as_int().to_be_bytes());
    } else {
        out.push(ROOT_REF);
        let target = offsets[&root.offset()];
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&target.to_be_bytes());
    }

    for off in &order {
        write_record(heap, Value::from_offset(*off), &offsets, &mut out);
    }

    let mut framed = Vec::with_capacity(out.len() + 8);
    framed.extend_from_slice(&MAGIC.to_be_bytes());
    framed.extend_from_slice(&(out.len() as u32).to_be_bytes());
    framed.extend_from_slice(&out);
    framed
}

struct RawRecord<'a> {
    tag: u8,
    payload: &'a [u8],
}

/// Reconstruct a value graph previously produced by [`gc_save`], allocating
/// into `heap`.
///
/// Allocation happens in two passes so that shared substructure and cycles
/// round-trip correctly: first every record gets an empty shell (so every
/// save-space offset has a live `Value` to resolve references against),
/// then a second pass fills in each shell's cells. `visit_roots` is
/// extended, for the duration of this call, to also cover every
/// already-allocated shell, so a collection triggered mid-load cannot
/// strand them.
pub fn gc_load<F>(heap: &mut Heap, buf: &[u8], mut visit_roots: F) -> Result<Value, SaveLoadError>
where
    F: FnMut(&mut dyn FnMut(&mut Value)),
{
    if buf.len() < 8 {
        return Err(SaveLoadError::Truncated);
    }
    let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(SaveLoadError::BadMagic);
    }
    let len = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    let body = buf.get(8..8 + len).ok_or(SaveLoadError::Truncated)?;
    if body.len() < 9 {
        return Err(SaveLoadError::Truncated);
    }

    let mut raw: HashMap<u32, RawRecord<'_>> = HashMap::new();
    let mut order: Vec<u32> = Vec::new();
    let mut pos = 9usize;
    while pos < body.len() {
        let start = pos as u32;
        let tag = body[pos];
        let plen = u32::from_be_bytes(
            body.get(pos + 1..pos + 5).ok_or(SaveLoadError::Truncated)?.try_into().unwrap(),
        ) as usize;
        let payload = body.get(pos + 5..pos + 5 + plen).ok_or(SaveLoadError::Truncated)?;
        raw.insert(start, RawRecord { tag, payload });
        order.push(start);
        pos += 5 + plen;
    }

    // Pass 1: allocate an empty shell per record (raw-byte kinds get their
    // final bytes immediately, since they carry no references).
    let mut loaded: HashMap<u32, Value> = HashMap::new();
    for &start in &order {
        let rec = &raw[&start];
        let tag = TypeTag::from_u8_checked(rec.tag).ok_or(SaveLoadError::CorruptTag(rec.tag))?;
        let v = if tag == TypeTag::Code {
            let p = rec.payload;
            if p.len() < CODE_PREFIX_SIZE {
                return Err(SaveLoadError::Truncated);
            }
            let nconsts = u16::from_be_bytes([p[6], p[7]]) as usize;
            let codelen = u32::from_be_bytes(p[8..12].try_into().unwrap()) as usize;
            let code_off = CODE_PREFIX_SIZE + nconsts * CELL_SIZE;
            let bytecode = p.get(code_off..code_off + codelen).ok_or(SaveLoadError::Truncated)?;
            let placeholder_consts = vec![Value::NULL; nconsts];
            let mut roots = |visit: &mut dyn FnMut(&mut Value)| {
                for v in loaded.values_mut() {
                    visit(v);
                }
                visit_roots(visit);
            };
            heap.alloc_code(
                CodeHeader {
                    argc: p[0],
                    seclevel: p[1],
                    nlocals: u16::from_be_bytes([p[2], p[3]]),
                    stack_depth: u16::from_be_bytes([p[4], p[5]]),
                },
                &placeholder_consts,
                bytecode,
                &mut roots,
            )
        } else if tag.payload_is_raw_bytes() {
            let mut roots = |visit: &mut dyn FnMut(&mut Value)| {
                for v in loaded.values_mut() {
                    visit(v);
                }
                visit_roots(visit);
            };
            heap.alloc_bytes(tag, rec.payload, &mut roots)
        } else {
            let ncells = rec.payload.len() / CELL_SIZE;
            let placeholder_cells = vec![Value::NULL; ncells];
            let mut roots = |visit: &mut dyn FnMut(&mut Value)| {
                for v in loaded.values_mut() {
                    visit(v);
                }
                visit_roots(visit);
            };
            heap.alloc_cells(tag, &placeholder_cells, &mut roots)
        };
        let v = v.unwrap_or_else(|e| panic!("gc_load: allocation failed: {e}"));
        loaded.insert(start, v);
    }

    // Pass 2: every shell now has a stable `Value`, so references (however
    // cyclic) all resolve. Patch cells in place; this never allocates.
    for &start in &order {
        let rec = &raw[&start];
        let target = loaded[&start];
        let tag = TypeTag::from_u8_checked(rec.tag).unwrap();
        if tag == TypeTag::Code {
            let nconsts = u16::from_be_bytes([rec.payload[6], rec.payload[7]]) as usize;
            for k in 0..nconsts {
                let off = CODE_PREFIX_SIZE + k * CELL_SIZE;
                let cell = read_cell(&rec.payload[off..off + CELL_SIZE], &loaded)?;
                heap.set_code_const(target, k, cell)
                    .unwrap_or_else(|e| panic!("gc_load: {e}"));
            }
        } else if !tag.payload_is_raw_bytes() {
            let ncells = rec.payload.len() / CELL_SIZE;
            for i in 0..ncells {
                let off = i * CELL_SIZE;
                let cell = read_cell(&rec.payload[off..off + CELL_SIZE], &loaded)?;
                heap.set_cell(target, i, cell).unwrap_or_else(|e| panic!("gc_load: {e}"));
            }
        }
    }

    match body[0] {
        ROOT_NULL => Ok(Value::NULL),
        ROOT_INT => Ok(Value::make_int(i64::from_be_bytes(body[1..9].try_into().unwrap()))),
        ROOT_REF => {
            let off = u32::from_be_bytes(body[5..9].try_into().unwrap());
            loaded.get(&off).copied().ok_or(SaveLoadError::DanglingReference(off))
        }
        other => Err(SaveLoadError::CorruptTag(other)),
    }
}

impl TypeTag {
    pub(crate) fn from_u8_checked(b: u8) -> Option<TypeTag> {
        if b < TypeTag::COUNT {
            Some(TypeTag::from_u8(b))
        } else {
            None
        }
    }
}
