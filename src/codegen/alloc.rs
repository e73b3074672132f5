// src/codegen/alloc.rs
//! Name allocators: scoreboard slots, interned literal-constant slots,
//! entity tags, extra objectives, and internal file paths. All names
//! share a stable prefix plus a monotonic counter so repeated
//! compilations of the same source produce identical output.

use rustc_hash::FxHashMap;

use crate::codegen::cmds::ScbSlot;

#[derive(Debug)]
pub struct Allocator {
    scoreboard: String,
    tag_prefix: String,
    internal_folder: String,
    slot_id: u32,
    tag_id: u32,
    obj_id: u32,
    file_id: u32,
    int_consts: FxHashMap<i32, ScbSlot>,
    int_const_order: Vec<i32>,
    extra_objectives: Vec<String>,
}

impl Allocator {
    pub fn new(scoreboard: &str, tag_prefix: &str, internal_folder: &str) -> Self {
        Self {
            scoreboard: scoreboard.to_string(),
            tag_prefix: tag_prefix.to_string(),
            internal_folder: internal_folder.to_string(),
            slot_id: 0,
            tag_id: 0,
            obj_id: 0,
            file_id: 0,
            int_consts: FxHashMap::default(),
            int_const_order: Vec::new(),
            extra_objectives: Vec::new(),
        }
    }

    pub fn scoreboard(&self) -> &str {
        &self.scoreboard
    }

    /// A fresh scoreboard slot on the main objective.
    pub fn slot(&mut self) -> ScbSlot {
        self.slot_id += 1;
        ScbSlot::new(format!("acacia{}", self.slot_id), self.scoreboard.clone())
    }

    /// Slot holding the literal `value`, loaded once in the init file.
    /// Needed for scoreboard operations that have no constant operand
    /// form (`*=`, `/=`, `%=`, comparisons between two scores).
    pub fn int_const(&mut self, value: i32) -> ScbSlot {
        if let Some(slot) = self.int_consts.get(&value) {
            return slot.clone();
        }
        let slot = self.slot();
        self.int_consts.insert(value, slot.clone());
        self.int_const_order.push(value);
        slot
    }

    /// Constant slots in allocation order, for init-file emission.
    pub fn int_consts(&self) -> impl Iterator<Item = (i32, &ScbSlot)> {
        self.int_const_order
            .iter()
            .map(|v| (*v, &self.int_consts[v]))
    }

    /// A fresh entity tag.
    pub fn tag(&mut self) -> String {
        self.tag_id += 1;
        format!("{}{}", self.tag_prefix, self.tag_id)
    }

    /// A fresh dedicated objective (entity fields each get one).
    pub fn objective(&mut self) -> String {
        self.obj_id += 1;
        let name = format!("{}{}", self.scoreboard, self.obj_id);
        self.extra_objectives.push(name.clone());
        name
    }

    pub fn extra_objectives(&self) -> &[String] {
        &self.extra_objectives
    }

    /// A fresh name-tag for a freshly summoned entity.
    pub fn entity_name(&mut self) -> String {
        self.tag_id += 1;
        format!("{}e{}", self.tag_prefix, self.tag_id)
    }

    /// A fresh internal file path under the internal folder.
    pub fn file_path(&mut self) -> String {
        self.file_id += 1;
        if self.internal_folder.is_empty() {
            format!("acacia{}", self.file_id)
        } else {
            format!("{}/acacia{}", self.internal_folder, self.file_id)
        }
    }
}
