//! Graph-coloring register allocation
//!
//! Vertices are the virtual references of one function, edges are
//! interference (simultaneous liveness). References already bound to a
//! hardware register are pre-colored with that register's color;
//! stack-homed references (address-taken variables) each get their own
//! non-assignable color and keep their slot. Whatever ends up outside the
//! assignable palette is spilled, one slot per color.

use crate::graph::{ColorAllocator, ColorId, Graph};
use crate::ir::*;
use crate::pass::PassContext;
use hashbrown::HashMap;
use rsharp_common::{RsError, RsResult};

pub fn assign_registers_graph_coloring(
    ctx: &mut PassContext,
    function: &mut Function,
) -> RsResult<()> {
    let arch = ctx.arch;
    let mut colors = ColorAllocator::new();

    let palette: Vec<ColorId> = arch.general_purpose.iter().map(|_| colors.fresh()).collect();
    let mut color_to_register: HashMap<ColorId, crate::arch::HwRegister> = HashMap::new();
    let mut register_to_color: HashMap<crate::arch::HwRegister, ColorId> = HashMap::new();
    for (color, register) in palette.iter().zip(&arch.general_purpose) {
        color_to_register.insert(*color, *register);
        register_to_color.insert(*register, *color);
    }
    // the frame base participates in interference but is never assignable
    let frame_color = colors.fresh();
    color_to_register.insert(frame_color, arch.frame_pointer);
    register_to_color.insert(arch.frame_pointer, frame_color);

    let mut graph = Graph::new();
    let mut vertex_of: HashMap<RefId, usize> = HashMap::new();
    let mut reference_of: Vec<RefId> = Vec::new();

    // vertices for every reference, edges for every interference
    let mut previous_result: Option<RefId> = None;
    for instr in &function.instructions {
        for operand in [&instr.result, &instr.op1, &instr.op2] {
            if let Operand::Ref(id) = operand {
                ensure_vertex(
                    ctx.pool,
                    &mut graph,
                    &mut colors,
                    &register_to_color,
                    &mut vertex_of,
                    &mut reference_of,
                    *id,
                )?;
            }
        }
        for live in &instr.meta.live_before {
            ensure_vertex(
                ctx.pool,
                &mut graph,
                &mut colors,
                &register_to_color,
                &mut vertex_of,
                &mut reference_of,
                *live,
            )?;
        }

        // the previous instruction's result interferes with everything
        // live right after it
        if let Some(defined) = previous_result {
            for live in &instr.meta.live_before {
                if *live == defined {
                    continue;
                }
                graph.add_edge(vertex_of[&defined], vertex_of[live]);
            }
        }

        // values simultaneously live interfere pairwise
        for live_a in &instr.meta.live_before {
            for live_b in &instr.meta.live_before {
                if live_a == live_b {
                    continue;
                }
                graph.add_edge(vertex_of[live_a], vertex_of[live_b]);
            }
        }

        previous_result = instr.result.as_ref_id();
    }

    if !graph.color_in(&palette, &mut colors) {
        return Err(internal(&format!(
            "register allocation failed for function \"{}\" despite unlimited stack colors",
            function.name
        )));
    }

    // spill slots start after the generator-assigned stack homes, which
    // by now only show up inside dynamic-constant operands
    let mut next_offset: u64 = 0;
    for instr in &function.instructions {
        for operand in [&instr.result, &instr.op1, &instr.op2] {
            let id = match operand {
                Operand::Ref(id) | Operand::StackOffsetOf(id) => *id,
                _ => continue,
            };
            if let Some(slot) = ctx.pool.stack_slot_of(id) {
                next_offset = next_offset.max(slot.offset + 8);
            }
        }
    }
    let mut slot_of_color: HashMap<ColorId, u64> = HashMap::new();

    for (vertex, id) in reference_of.iter().enumerate() {
        let reference = ctx.pool.reference(*id);
        if reference.pinned {
            // pre-assigned storage survives allocation untouched
            continue;
        }
        let color = graph
            .color(vertex)
            .ok_or_else(|| internal("uncolored vertex after successful coloring"))?;
        if let Some(register) = color_to_register.get(&color) {
            ctx.pool.reference_mut(*id).storage = Some(Storage::Register(*register));
        } else {
            let offset = *slot_of_color.entry(color).or_insert_with(|| {
                let offset = next_offset;
                next_offset += 8;
                offset
            });
            ctx.pool.reference_mut(*id).storage = Some(Storage::Stack(StackSlot { offset }));
        }
    }

    Ok(())
}

/// Populate the function metadata consumed by the emitters
pub fn enumerate_registers(ctx: &mut PassContext, function: &mut Function) -> RsResult<()> {
    function.meta = FunctionMeta::default();

    for instr in &function.instructions {
        for operand in [&instr.result, &instr.op1, &instr.op2] {
            match operand {
                Operand::Ref(id) => {
                    function.meta.all_references.insert(*id);
                }
                // dynamic constants keep their reference's slot alive
                Operand::StackOffsetOf(id) => {
                    function.meta.all_references.insert(*id);
                }
                _ => {}
            }
        }
    }

    let mut slots = std::collections::BTreeSet::new();
    for id in &function.meta.all_references {
        match ctx.pool.reference(*id).storage {
            Some(Storage::Register(register)) => {
                function.meta.all_registers.insert(register);
            }
            Some(Storage::Stack(slot)) => {
                slots.insert(slot.offset);
            }
            None => {}
        }
    }
    function.meta.max_stack_usage = 8 * slots.len() as u64;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn ensure_vertex(
    pool: &IrPool,
    graph: &mut Graph,
    colors: &mut ColorAllocator,
    register_to_color: &HashMap<crate::arch::HwRegister, ColorId>,
    vertex_of: &mut HashMap<RefId, usize>,
    reference_of: &mut Vec<RefId>,
    id: RefId,
) -> RsResult<usize> {
    if let Some(vertex) = vertex_of.get(&id) {
        return Ok(*vertex);
    }
    let pre_color = match pool.reference(id).storage {
        Some(Storage::Register(register)) => Some(
            *register_to_color
                .get(&register)
                .ok_or_else(|| internal("reference pinned to an unknown register"))?,
        ),
        // each stack-homed reference gets its own non-assignable color
        Some(Storage::Stack(_)) => Some(colors.fresh()),
        None => None,
    };
    let vertex = graph.add_vertex(pre_color);
    vertex_of.insert(id, vertex);
    reference_of.push(id);
    Ok(vertex)
}

fn internal(message: &str) -> RsError {
    RsError::codegen_error(format!("Internal error: {}", message))
}
