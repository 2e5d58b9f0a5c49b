//! Particle emitter modules (group 15).
//!
//! A module is a statement-producing node: it reads its inputs through the
//! usual box evaluation, reads and writes particle attributes of the current
//! particle and emits plain HLSL statements into the stage body. Modules never
//! produce values for other nodes.

use super::attributes::{AttributeSpace, attribute_kind_from_code};
use crate::generator::compilation::Compilation;
use crate::generator::node_compiler::texture_nodes::{global_sdf, sample_scene_depth};
use crate::generator::types::{Value, ValueType};
use crate::graph::Node;

pub const UPDATE_AGE: u16 = 1;
pub const GRAVITY: u16 = 2;
pub const FORCE: u16 = 3;
pub const LINEAR_DRAG: u16 = 4;
pub const CONFORM_TO_SPHERE: u16 = 5;
pub const KILL_SPHERE: u16 = 6;
pub const KILL_BOX: u16 = 7;
pub const KILL_CUSTOM: u16 = 8;
pub const POSITION_SPHERE_SURFACE: u16 = 10;
pub const POSITION_PLANE: u16 = 11;
pub const POSITION_CIRCLE: u16 = 12;
pub const POSITION_DISC: u16 = 13;
pub const POSITION_BOX_VOLUME: u16 = 14;
pub const POSITION_CYLINDER: u16 = 15;
pub const POSITION_TORUS: u16 = 16;
pub const POSITION_DEPTH: u16 = 17;
pub const POSITION_SPIRAL: u16 = 18;
pub const POSITION_GLOBAL_SDF: u16 = 19;
pub const COLLISION_PLANE: u16 = 20;
pub const COLLISION_SPHERE: u16 = 21;
pub const COLLISION_BOX: u16 = 22;
pub const COLLISION_CYLINDER: u16 = 23;
pub const COLLISION_DEPTH: u16 = 24;
pub const COLLISION_GLOBAL_SDF: u16 = 25;
pub const SET_ATTRIBUTE: u16 = 30;

/// Uniform random number in [0, 1), a new one per use.
const RAND: &str = "RAND";
const RAND2: &str = "RAND2";
const RAND3: &str = "RAND3";

/// Emitter entry point a module contributes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleStage {
    Initialize,
    Update,
}

impl ModuleStage {
    pub const ALL: [ModuleStage; 2] = [ModuleStage::Initialize, ModuleStage::Update];

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(ModuleStage::Initialize),
            1 => Some(ModuleStage::Update),
            _ => None,
        }
    }

    /// HLSL function name of the stage.
    pub fn function_name(self) -> &'static str {
        match self {
            ModuleStage::Initialize => "Initialize",
            ModuleStage::Update => "Update",
        }
    }
}

/// `values[0]`; modules without the flag are enabled.
pub fn is_enabled(node: &Node) -> bool {
    node.value_bool(0, true)
}

/// `values[1]`; `None` for an out-of-range stage.
pub fn module_stage(node: &Node) -> Option<ModuleStage> {
    ModuleStage::from_i32(node.value_i32(1, 1))
}

/// Emit the statements of module `node` into the current stage body.
pub fn compile_module(comp: &mut Compilation, node: &Node) {
    match node.type_id.subtype() {
        UPDATE_AGE => {
            let age = read(comp, node, "Age", ValueType::Float);
            store(comp, node, "Age", &Value::new(ValueType::Float, format!("{} + DeltaTime", age.expr)));
        }
        GRAVITY => {
            let gravity = input(comp, node, 0, Value::float3([0.0, -981.0, 0.0]));
            add_velocity(comp, node, &format!("{} * DeltaTime", gravity.expr));
        }
        FORCE => {
            let force = input(comp, node, 0, Value::float3([0.0; 3]));
            let mass = read(comp, node, "Mass", ValueType::Float);
            add_velocity(
                comp,
                node,
                &format!("{} / max({}, 0.0001) * DeltaTime", force.expr, mass.expr),
            );
        }
        LINEAR_DRAG => compile_linear_drag(comp, node),
        CONFORM_TO_SPHERE => compile_conform_to_sphere(comp, node),
        KILL_SPHERE | KILL_BOX | KILL_CUSTOM => compile_kill(comp, node),
        POSITION_SPHERE_SURFACE..=POSITION_GLOBAL_SDF => compile_position(comp, node),
        COLLISION_PLANE..=COLLISION_GLOBAL_SDF => compile_collision(comp, node),
        SET_ATTRIBUTE => compile_set_attribute(comp, node),
        other => comp.error(node, 0, format!("unsupported particle module {other}")),
    }
}

fn read(comp: &mut Compilation, node: &Node, name: &str, kind: ValueType) -> Value {
    comp.access_particle_attribute(node, 0, name, kind, None, AttributeSpace::Simulation)
}

fn store(comp: &mut Compilation, node: &Node, name: &str, value: &Value) {
    comp.write_particle_attribute(node, 0, name, value);
}

/// Input `box_id` cast to the kind of `default`.
fn input(comp: &mut Compilation, node: &Node, box_id: u32, default: Value) -> Value {
    let ty = default.ty;
    comp.try_get_value(node, box_id, default).cast(ty)
}

fn local(comp: &mut Compilation, node: &Node, ty: ValueType, expr: &str) -> Value {
    comp.writer.write_local(ty, Some(expr), Some(node.id))
}

fn add_velocity(comp: &mut Compilation, node: &Node, delta: &str) {
    let velocity = read(comp, node, "Velocity", ValueType::Float3);
    store(
        comp,
        node,
        "Velocity",
        &Value::new(ValueType::Float3, format!("{} + {delta}", velocity.expr)),
    );
}

/// Open `if (condition) {`; close with [`end_block`].
fn begin_block(comp: &mut Compilation, condition: &Value) {
    comp.writer.write_line(&format!("if ({})", condition.expr));
    comp.writer.write_line("{");
    comp.writer.push_indent();
}

fn end_block(comp: &mut Compilation) {
    comp.writer.pop_indent();
    comp.writer.write_line("}");
}

/// Drag 0; `values[2]` scales drag by the particle cross-section.
fn compile_linear_drag(comp: &mut Compilation, node: &Node) {
    let drag = input(comp, node, 0, Value::float(1.0));
    let mass = read(comp, node, "Mass", ValueType::Float);
    let drag = if node.value_bool(2, false) {
        let size = read(comp, node, "Size", ValueType::Float2);
        local(comp, node, ValueType::Float, &format!("{} * {}.x * {}.y", drag.expr, size.expr, size.expr))
    } else {
        drag
    };
    let velocity = read(comp, node, "Velocity", ValueType::Float3);
    let expr = format!(
        "{} * max(1 - {} * DeltaTime / max({}, 0.0001), 0)",
        velocity.expr, drag.expr, mass.expr
    );
    store(comp, node, "Velocity", &Value::new(ValueType::Float3, expr));
}

/// Center 0, radius 1, attraction speed 2, attraction force 3, stick distance 4, stick force 5.
fn compile_conform_to_sphere(comp: &mut Compilation, node: &Node) {
    let center = input(comp, node, 0, Value::float3([0.0; 3]));
    let radius = input(comp, node, 1, Value::float(100.0));
    let speed = input(comp, node, 2, Value::float(100.0));
    let force = input(comp, node, 3, Value::float(200.0));
    let stick_distance = input(comp, node, 4, Value::float(10.0));
    let stick_force = input(comp, node, 5, Value::float(15.0));
    let position = read(comp, node, "Position", ValueType::Float3);
    let velocity = read(comp, node, "Velocity", ValueType::Float3);
    let mass = read(comp, node, "Mass", ValueType::Float);

    let f3 = ValueType::Float3;
    let f1 = ValueType::Float;
    let dir = local(comp, node, f3, &format!("{} - {}", center.expr, position.expr));
    let dist = local(comp, node, f1, &format!("length({})", dir.expr));
    let to_surface = local(comp, node, f1, &format!("{} - {}", dist.expr, radius.expr));
    let normal = local(comp, node, f3, &format!("{} / max({}, 0.0001)", dir.expr, dist.expr));
    let normal_speed = local(comp, node, f1, &format!("dot({}, {})", normal.expr, velocity.expr));
    let ratio = local(
        comp,
        node,
        f1,
        &format!("smoothstep(0, {} * 2, abs({}))", stick_distance.expr, to_surface.expr),
    );
    let target = local(
        comp,
        node,
        f1,
        &format!("sign({}) * {} * {}", to_surface.expr, speed.expr, ratio.expr),
    );
    let delta = local(comp, node, f1, &format!("{} - {}", target.expr, normal_speed.expr));
    let expr = format!(
        "{0} + {1} * (sign({2}) * min(abs({2}), DeltaTime * lerp({3}, {4}, {5})) / max({6}, 0.0001))",
        velocity.expr, normal.expr, delta.expr, stick_force.expr, force.expr, ratio.expr, mass.expr
    );
    store(comp, node, "Velocity", &Value::new(f3, expr));
}

/// Kill modules age the particle past its lifetime; `values[2]` inverts the volume test.
fn compile_kill(comp: &mut Compilation, node: &Node) {
    let invert = node.value_bool(2, false);
    let condition = match node.type_id.subtype() {
        KILL_SPHERE => {
            let center = input(comp, node, 0, Value::float3([0.0; 3]));
            let radius = input(comp, node, 1, Value::float(100.0));
            let position = read(comp, node, "Position", ValueType::Float3);
            let op = if invert { ">" } else { "<=" };
            let expr = format!("distance({}, {}) {op} {}", position.expr, center.expr, radius.expr);
            local(comp, node, ValueType::Bool, &expr)
        }
        KILL_BOX => {
            let center = input(comp, node, 0, Value::float3([0.0; 3]));
            let size = input(comp, node, 1, Value::float3([100.0; 3]));
            let position = read(comp, node, "Position", ValueType::Float3);
            let offset = local(
                comp,
                node,
                ValueType::Float3,
                &format!("abs({} - {})", position.expr, center.expr),
            );
            let expr = if invert {
                format!("any({} > {} * 0.5)", offset.expr, size.expr)
            } else {
                format!("all({} <= {} * 0.5)", offset.expr, size.expr)
            };
            local(comp, node, ValueType::Bool, &expr)
        }
        _ => input(comp, node, 0, Value::bool(false)),
    };
    if condition.expr == "false" {
        return;
    }
    let lifetime = read(comp, node, "Lifetime", ValueType::Float);
    begin_block(comp, &condition);
    store(comp, node, "Age", &lifetime);
    end_block(comp);
}

/// Write a new particle position. Shape inputs start at box 0.
fn compile_position(comp: &mut Compilation, node: &Node) {
    let f1 = ValueType::Float;
    let f3 = ValueType::Float3;
    let subtype = node.type_id.subtype();
    let center = input(comp, node, 0, Value::float3([0.0; 3]));
    let position = match subtype {
        POSITION_SPHERE_SURFACE => {
            let radius = input(comp, node, 1, Value::float(100.0));
            let arc = input(comp, node, 2, Value::float(360.0));
            let phi = local(comp, node, f1, &format!("radians({}) * {RAND}", arc.expr));
            let cos_theta = local(comp, node, f1, &format!("{RAND} * 2 - 1"));
            let sin_theta = local(comp, node, f1, &format!("sqrt(1 - {0} * {0})", cos_theta.expr));
            let expr = format!(
                "{0} + {1} * float3({3} * cos({2}), {4}, {3} * sin({2}))",
                center.expr, radius.expr, phi.expr, sin_theta.expr, cos_theta.expr
            );
            local(comp, node, f3, &expr)
        }
        POSITION_PLANE => {
            let size = input(comp, node, 1, Value::float2([100.0, 100.0]));
            let expr = format!(
                "{0} + float3(({RAND} - 0.5) * {1}.x, 0, ({RAND} - 0.5) * {1}.y)",
                center.expr, size.expr
            );
            local(comp, node, f3, &expr)
        }
        POSITION_CIRCLE | POSITION_DISC => {
            let radius = input(comp, node, 1, Value::float(100.0));
            let arc = input(comp, node, 2, Value::float(360.0));
            let angle = local(comp, node, f1, &format!("radians({}) * {RAND}", arc.expr));
            let distance = if subtype == POSITION_DISC {
                local(comp, node, f1, &format!("{} * sqrt({RAND})", radius.expr))
            } else {
                radius
            };
            let expr = format!(
                "{0} + float3(cos({1}), sin({1}), 0) * {2}",
                center.expr, angle.expr, distance.expr
            );
            local(comp, node, f3, &expr)
        }
        POSITION_BOX_VOLUME => {
            let size = input(comp, node, 1, Value::float3([100.0; 3]));
            let expr = format!("{} + ({RAND3} - 0.5) * {}", center.expr, size.expr);
            local(comp, node, f3, &expr)
        }
        POSITION_CYLINDER => {
            let radius = input(comp, node, 1, Value::float(100.0));
            let height = input(comp, node, 2, Value::float(200.0));
            let arc = input(comp, node, 3, Value::float(360.0));
            let angle = local(comp, node, f1, &format!("radians({}) * {RAND}", arc.expr));
            let expr = format!(
                "{0} + float3({1} * cos({2}), {1} * sin({2}), {3} * {RAND})",
                center.expr, radius.expr, angle.expr, height.expr
            );
            local(comp, node, f3, &expr)
        }
        POSITION_TORUS => {
            let radius = input(comp, node, 1, Value::float(100.0));
            let thickness = input(comp, node, 2, Value::float(20.0));
            let arc = input(comp, node, 3, Value::float(360.0));
            let u = local(comp, node, f1, &format!("radians({}) * {RAND}", arc.expr));
            let v = local(comp, node, f1, &format!("6.28318530718 * {RAND}"));
            let r = local(comp, node, f1, &format!("{} * sqrt({RAND})", thickness.expr));
            let ring = local(comp, node, f1, &format!("{} + {} * cos({})", radius.expr, r.expr, v.expr));
            let expr = format!(
                "{0} + float3({1} * cos({2}), {1} * sin({2}), {3} * sin({4}))",
                center.expr, ring.expr, u.expr, r.expr, v.expr
            );
            local(comp, node, f3, &expr)
        }
        POSITION_DEPTH => {
            // Box 0 is the screen UV here, box 1 the offset towards the camera.
            let uv = comp
                .try_get_value(node, 0, Value::new(ValueType::Float2, RAND2))
                .cast(ValueType::Float2);
            let uv = local(comp, node, ValueType::Float2, &uv.expr);
            let offset = input(comp, node, 1, Value::float(1.0));
            let depth = sample_scene_depth(comp, node, &uv);
            let world = local(
                comp,
                node,
                f3,
                &format!("GetWorldPosition(ViewInfo, {}, {})", uv.expr, depth.expr),
            );
            let expr = format!(
                "{0} + normalize(ViewPos - {0}) * {1}",
                world.expr, offset.expr
            );
            local(comp, node, f3, &expr)
        }
        POSITION_SPIRAL => {
            let rotation_speed = input(comp, node, 1, Value::float(1.0));
            let velocity_scale = input(comp, node, 2, Value::float(1.0));
            let index = comp.particle_index();
            let angle = local(
                comp,
                node,
                f1,
                &format!("(float){} * {}", index.expr, rotation_speed.expr),
            );
            add_velocity(
                comp,
                node,
                &format!("float3(cos({0}), 0, sin({0})) * {1}", angle.expr, velocity_scale.expr),
            );
            center
        }
        _ => {
            // Global SDF: project the current position onto the nearest surface.
            let current = read(comp, node, "Position", f3);
            let Some(sdf) = global_sdf(comp) else {
                return;
            };
            let distance = comp.writer.write_local(f1, None, Some(node.id));
            let gradient = local(
                comp,
                node,
                f3,
                &format!(
                    "SampleGlobalSDFGradient({sdf}, {sdf}_Tex, {sdf}_Mip, {}, {})",
                    current.expr, distance.expr
                ),
            );
            let expr = format!(
                "{} - normalize({}) * {}",
                current.expr, gradient.expr, distance.expr
            );
            local(comp, node, f3, &expr)
        }
    };
    store(comp, node, "Position", &position);
}

/// Shared collision inputs: radius 0, roughness 1, elasticity 2, friction 3,
/// lifetime loss 4; shape inputs start at box 5. `values[2]` keeps particles
/// inside the shape instead of outside.
fn compile_collision(comp: &mut Compilation, node: &Node) {
    let f1 = ValueType::Float;
    let f3 = ValueType::Float3;
    let radius = input(comp, node, 0, Value::float(5.0));
    let roughness = input(comp, node, 1, Value::float(0.0));
    let elasticity = input(comp, node, 2, Value::float(0.5));
    let friction = input(comp, node, 3, Value::float(0.0));
    let lifetime_loss = input(comp, node, 4, Value::float(0.0));
    let invert = node.value_bool(2, false);

    let position = read(comp, node, "Position", f3);
    let velocity = read(comp, node, "Velocity", f3);
    let age = read(comp, node, "Age", f1);
    let lifetime = read(comp, node, "Lifetime", f1);
    let next = local(comp, node, f3, &format!("{} + {} * DeltaTime", position.expr, velocity.expr));
    let normal = comp.writer.write_local(f3, Some("float3(0,1,0)"), Some(node.id));
    let contact = local(comp, node, f3, &next.expr);
    let hit = comp.writer.write_local(ValueType::Bool, Some("false"), Some(node.id));

    let (n, c, h, p, r) = (&normal.expr, &contact.expr, &hit.expr, &next.expr, &radius.expr);
    match node.type_id.subtype() {
        COLLISION_PLANE => {
            let plane_pos = input(comp, node, 5, Value::float3([0.0; 3]));
            let plane_normal = input(comp, node, 6, Value::float3([0.0, 1.0, 0.0]));
            let d = local(
                comp,
                node,
                f1,
                &format!("dot({p} - {}, {}) - {r}", plane_pos.expr, plane_normal.expr),
            );
            let w = &mut comp.writer;
            w.write_line(&format!("{h} = {} < 0;", d.expr));
            w.write_line(&format!("{n} = {};", plane_normal.expr));
            w.write_line(&format!("{c} = {p} - {} * {};", plane_normal.expr, d.expr));
        }
        COLLISION_SPHERE => {
            let center = input(comp, node, 5, Value::float3([0.0; 3]));
            let sphere = input(comp, node, 6, Value::float(100.0));
            let offset = local(comp, node, f3, &format!("{p} - {}", center.expr));
            let dist = local(comp, node, f1, &format!("length({})", offset.expr));
            let (o, d, s, ce) = (&offset.expr, &dist.expr, &sphere.expr, &center.expr);
            let w = &mut comp.writer;
            if invert {
                w.write_line(&format!("{h} = {d} > {s} - {r};"));
                w.write_line(&format!("{n} = -{o} / max({d}, 0.0001);"));
                w.write_line(&format!("{c} = {ce} - {n} * ({s} - {r});"));
            } else {
                w.write_line(&format!("{h} = {d} < {s} + {r};"));
                w.write_line(&format!("{n} = {o} / max({d}, 0.0001);"));
                w.write_line(&format!("{c} = {ce} + {n} * ({s} + {r});"));
            }
        }
        COLLISION_BOX => {
            let center = input(comp, node, 5, Value::float3([0.0; 3]));
            let size = input(comp, node, 6, Value::float3([100.0; 3]));
            let offset = local(comp, node, f3, &format!("{p} - {}", center.expr));
            if invert {
                let half = local(comp, node, f3, &format!("{} * 0.5 - {r}", size.expr));
                let (o, hb, ce) = (&offset.expr, &half.expr, &center.expr);
                let w = &mut comp.writer;
                w.write_line(&format!("{h} = any(abs({o}) > {hb});"));
                w.write_line(&format!("{c} = {ce} + clamp({o}, -{hb}, {hb});"));
                w.write_line(&format!("{n} = normalize({c} - {p} + 0.0001);"));
            } else {
                let half = local(comp, node, f3, &format!("{} * 0.5 + {r}", size.expr));
                let pen = local(comp, node, f3, &format!("{} - abs({})", half.expr, offset.expr));
                let (o, pe) = (&offset.expr, &pen.expr);
                let w = &mut comp.writer;
                w.write_line(&format!("{h} = all({pe} > 0);"));
                w.write_line(&format!(
                    "{n} = {pe}.x < {pe}.y && {pe}.x < {pe}.z ? float3(sign({o}.x), 0, 0) : ({pe}.y < {pe}.z ? float3(0, sign({o}.y), 0) : float3(0, 0, sign({o}.z)));"
                ));
                w.write_line(&format!("{c} = {p} + {n} * min({pe}.x, min({pe}.y, {pe}.z));"));
            }
        }
        COLLISION_CYLINDER => {
            let center = input(comp, node, 5, Value::float3([0.0; 3]));
            let height = input(comp, node, 6, Value::float(200.0));
            let cyl = input(comp, node, 7, Value::float(100.0));
            let offset = local(comp, node, f3, &format!("{p} - {}", center.expr));
            let dist = local(comp, node, f1, &format!("length({}.xz)", offset.expr));
            let (o, d, cr, ht, ce) = (&offset.expr, &dist.expr, &cyl.expr, &height.expr, &center.expr);
            let w = &mut comp.writer;
            if invert {
                w.write_line(&format!("{h} = {d} > {cr} - {r};"));
                w.write_line(&format!("{n} = -float3({o}.x, 0, {o}.z) / max({d}, 0.0001);"));
                w.write_line(&format!(
                    "{c} = {ce} + float3(-{n}.x * ({cr} - {r}), {o}.y, -{n}.z * ({cr} - {r}));"
                ));
            } else {
                w.write_line(&format!("{h} = {d} < {cr} + {r} && abs({o}.y) < {ht} * 0.5 + {r};"));
                w.write_line(&format!("{n} = float3({o}.x, 0, {o}.z) / max({d}, 0.0001);"));
                w.write_line(&format!(
                    "{c} = {ce} + float3({n}.x * ({cr} + {r}), {o}.y, {n}.z * ({cr} + {r}));"
                ));
            }
        }
        COLLISION_DEPTH => {
            let thickness = input(comp, node, 5, Value::float(100.0));
            let clip = local(
                comp,
                node,
                ValueType::Float4,
                &format!("mul(float4({p}, 1), ViewProjectionMatrix)"),
            );
            let uv = local(
                comp,
                node,
                ValueType::Float2,
                &format!("{0}.xy / {0}.w * float2(0.5, -0.5) + 0.5", clip.expr),
            );
            let depth = sample_scene_depth(comp, node, &uv);
            let (cl, u, dp, th) = (&clip.expr, &uv.expr, &depth.expr, &thickness.expr);
            let w = &mut comp.writer;
            w.write_line(&format!(
                "{h} = all({u} >= 0) && all({u} <= 1) && {cl}.w + {r} > {dp} && {cl}.w - {r} < {dp} + {th};"
            ));
            w.write_line(&format!("{n} = normalize(ViewPos - {p});"));
            w.write_line(&format!("{c} = {p} + {n} * ({cl}.w - {dp} + {r});"));
        }
        _ => {
            let Some(sdf) = global_sdf(comp) else {
                return;
            };
            let distance = comp.writer.write_local(f1, None, Some(node.id));
            let gradient = local(
                comp,
                node,
                f3,
                &format!("SampleGlobalSDFGradient({sdf}, {sdf}_Tex, {sdf}_Mip, {p}, {})", distance.expr),
            );
            let (d, g) = (&distance.expr, &gradient.expr);
            let w = &mut comp.writer;
            w.write_line(&format!("{h} = {d} < {r};"));
            w.write_line(&format!("{n} = normalize({g} + 0.0001);"));
            w.write_line(&format!("{c} = {p} + {n} * ({r} - {d});"));
        }
    }

    begin_block(comp, &hit);
    let w = &mut comp.writer;
    let v = &velocity.expr;
    if !roughness.is_zero_literal() {
        w.write_line(&format!("{n} = normalize(lerp({n}, {RAND3} * 2 - 1, {}));", roughness.expr));
    }
    w.write_line(&format!("float3 Normal{} = dot({v}, {n}) * {n};", node.id));
    w.write_line(&format!(
        "{v} = ({v} - Normal{id}) * (1 - {}) - Normal{id} * {};",
        friction.expr,
        elasticity.expr,
        id = node.id
    ));
    w.write_line(&format!("{} = {c};", position.expr));
    if !lifetime_loss.is_zero_literal() {
        let aged = Value::new(
            f1,
            format!("{} + {} * {}", age.expr, lifetime.expr, lifetime_loss.expr),
        );
        store(comp, node, "Age", &aged);
    }
    end_block(comp);
    store(comp, node, "Position", &position);
    store(comp, node, "Velocity", &velocity);
}

/// Value 0; `values[2]` attribute name, `values[3]` value kind code.
fn compile_set_attribute(comp: &mut Compilation, node: &Node) {
    let name = node.value(2).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let code = node.value_i32(3, 0);
    let Some(kind) = attribute_kind_from_code(code) else {
        comp.error(node, 0, format!("invalid particle attribute kind {code}"));
        return;
    };
    if name.is_empty() {
        comp.error(node, 0, "missing particle attribute name");
        return;
    }
    let value = input(comp, node, 0, Value::zero(kind));
    store(comp, node, &name, &value);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::asset_store::AssetStore;
    use crate::graph::{Graph, NodeTypeId, NodeValue};

    fn module(id: u32, subtype: u16) -> Node {
        Node::new(id, NodeTypeId::new(15, subtype))
            .with_value(NodeValue::Bool(true))
            .with_value(NodeValue::Int(1))
    }

    fn run(graph: Graph) -> Compilation {
        let g = Arc::new(graph);
        let mut c = Compilation::new_emitter(Uuid::new_v4(), g.clone(), AssetStore::new());
        for node in g.nodes() {
            compile_module(&mut c, node);
        }
        c
    }

    #[test]
    fn update_age_adds_delta_time() {
        let mut g = Graph::new();
        g.add_node(module(1, UPDATE_AGE)).unwrap();
        let c = run(g);
        assert_eq!(
            c.writer.text(),
            "\tfloat Local1 = GetParticleFloat(Param1, context.ParticleIndex);\n\
             \tSetParticleFloat(Param1, context.ParticleIndex, Local1 + DeltaTime);\n"
        );
        assert_eq!(c.particle_layout.find("Age").unwrap().offset, 0);
    }

    #[test]
    fn gravity_uses_connected_input() {
        let mut g = Graph::new();
        g.add_node(module(1, GRAVITY).with_box(0, ValueType::Float3)).unwrap();
        g.add_node(
            Node::new(2, NodeTypeId::new(5, 5))
                .with_box(0, ValueType::Float3)
                .with_value(NodeValue::Float3([0.0, -10.0, 0.0])),
        )
        .unwrap();
        g.connect_ids(2, 0, 1, 0).unwrap();
        let c = run(g);
        assert!(c.writer.text().contains(
            "SetParticleVec3(Param1, context.ParticleIndex, Local1 + float3(0,-10,0) * DeltaTime);"
        ));
    }

    #[test]
    fn kill_box_is_terminated_hlsl() {
        let mut g = Graph::new();
        g.add_node(module(1, KILL_BOX)).unwrap();
        let c = run(g);
        let text = c.writer.text();
        assert!(text.contains("bool Local3 = all(Local2 <= float3(100,100,100) * 0.5);"));
        assert!(text.contains("\tif (Local3)\n\t{\n\t\tSetParticleFloat("));
        for line in text.lines().map(str::trim) {
            assert!(
                line.ends_with(';') || line.starts_with("if (") || line == "{" || line == "}",
                "unterminated statement: {line}"
            );
        }
    }

    #[test]
    fn set_attribute_requires_a_name() {
        let mut g = Graph::new();
        g.add_node(module(1, SET_ATTRIBUTE).with_value(NodeValue::String(String::new())))
            .unwrap();
        let c = run(g);
        assert_eq!(c.errors().len(), 1);
        assert!(c.writer.text().is_empty());
    }

    #[test]
    fn collision_writes_back_position_and_velocity() {
        let mut g = Graph::new();
        g.add_node(module(1, COLLISION_PLANE)).unwrap();
        let c = run(g);
        let text = c.writer.text();
        assert!(text.contains("float Local9 = dot(Local5 - float3(0,0,0), float3(0,1,0)) - 5;"));
        assert!(text.contains("Local2 = (Local2 - Normal1) * (1 - 0) - Normal1 * 0.5;"));
        assert!(text.ends_with(
            "\tSetParticleVec3(Param1, context.ParticleIndex, Local1);\n\
             \tSetParticleVec3(Param2, context.ParticleIndex, Local2);\n"
        ));
    }

    /// Lines of a single-module run, without indentation.
    fn lines_of(subtype: u16) -> Vec<String> {
        let mut g = Graph::new();
        g.add_node(module(1, subtype)).unwrap();
        let c = run(g);
        assert!(c.errors().is_empty(), "{:?}", c.errors());
        c.writer.text().lines().map(|l| l.trim().to_string()).collect()
    }

    #[test]
    fn position_sphere_surface_uses_unit_sphere_terms() {
        assert_eq!(
            lines_of(POSITION_SPHERE_SURFACE),
            [
                "float Local1 = radians(360) * RAND;",
                "float Local2 = RAND * 2 - 1;",
                "float Local3 = sqrt(1 - Local2 * Local2);",
                "float3 Local4 = float3(0,0,0) + 100 * float3(Local3 * cos(Local1), Local2, Local3 * sin(Local1));",
                "SetParticleVec3(Param1, context.ParticleIndex, Local4);",
            ]
        );
    }

    #[test]
    fn position_plane_and_box_scale_random_offsets() {
        assert_eq!(
            lines_of(POSITION_PLANE)[0],
            "float3 Local1 = float3(0,0,0) + float3((RAND - 0.5) * float2(100,100).x, 0, (RAND - 0.5) * float2(100,100).y);"
        );
        assert_eq!(
            lines_of(POSITION_BOX_VOLUME)[0],
            "float3 Local1 = float3(0,0,0) + (RAND3 - 0.5) * float3(100,100,100);"
        );
    }

    #[test]
    fn position_circle_scales_by_radius() {
        assert_eq!(
            lines_of(POSITION_CIRCLE),
            [
                "float Local1 = radians(360) * RAND;",
                "float3 Local2 = float3(0,0,0) + float3(cos(Local1), sin(Local1), 0) * 100;",
                "SetParticleVec3(Param1, context.ParticleIndex, Local2);",
            ]
        );
    }

    #[test]
    fn position_disc_scales_by_random_distance() {
        assert_eq!(
            lines_of(POSITION_DISC),
            [
                "float Local1 = radians(360) * RAND;",
                "float Local2 = 100 * sqrt(RAND);",
                "float3 Local3 = float3(0,0,0) + float3(cos(Local1), sin(Local1), 0) * Local2;",
                "SetParticleVec3(Param1, context.ParticleIndex, Local3);",
            ]
        );
    }

    #[test]
    fn position_cylinder_spreads_along_height() {
        assert_eq!(
            lines_of(POSITION_CYLINDER)[1],
            "float3 Local2 = float3(0,0,0) + float3(100 * cos(Local1), 100 * sin(Local1), 200 * RAND);"
        );
    }

    #[test]
    fn position_torus_offsets_by_tube_radius() {
        assert_eq!(
            lines_of(POSITION_TORUS),
            [
                "float Local1 = radians(360) * RAND;",
                "float Local2 = 6.28318530718 * RAND;",
                "float Local3 = 20 * sqrt(RAND);",
                "float Local4 = 100 + Local3 * cos(Local2);",
                "float3 Local5 = float3(0,0,0) + float3(Local4 * cos(Local1), Local4 * sin(Local1), Local3 * sin(Local2));",
                "SetParticleVec3(Param1, context.ParticleIndex, Local5);",
            ]
        );
    }

    #[test]
    fn conform_to_sphere_limits_the_velocity_change() {
        let lines = lines_of(CONFORM_TO_SPHERE);
        assert_eq!(lines[9], "float Local10 = sign(Local6) * 100 * Local9;");
        assert_eq!(lines[10], "float Local11 = Local10 - Local8;");
        assert_eq!(
            lines.last().unwrap(),
            "SetParticleVec3(Param2, context.ParticleIndex, \
             Local2 + Local7 * (sign(Local11) * min(abs(Local11), DeltaTime * lerp(15, 200, Local9)) / max(Local3, 0.0001)));"
        );
    }

    #[test]
    fn vertex_color_input_compiles_without_layers() {
        let mut g = Graph::new();
        g.add_node(module(1, GRAVITY).with_box(0, ValueType::Float3)).unwrap();
        g.add_node(Node::new(2, NodeTypeId::new(1, 13)).with_box(0, ValueType::Float4))
            .unwrap();
        g.connect_ids(2, 0, 1, 0).unwrap();
        let c = run(g);
        assert!(c.errors().is_empty(), "{:?}", c.errors());
        assert!(c.writer.text().contains(
            "SetParticleVec3(Param1, context.ParticleIndex, Local1 + input.VertexColor.xyz * DeltaTime);"
        ));
    }

    #[test]
    fn sampled_layer_is_reported_in_emitters() {
        let mut g = Graph::new();
        g.add_node(module(1, GRAVITY).with_box(0, ValueType::Float3)).unwrap();
        g.add_node(
            Node::new(2, NodeTypeId::new(6, 1))
                .with_box(0, ValueType::Object)
                .with_value(NodeValue::Guid(Uuid::new_v4())),
        )
        .unwrap();
        g.connect_ids(2, 0, 1, 0).unwrap();
        let c = run(g);
        assert_eq!(c.errors().len(), 1);
        assert!(c.errors()[0].message.contains("not available in particle emitters"));
        assert!(c.writer.text().contains("float3(0,-981,0) * DeltaTime"));
    }
}
