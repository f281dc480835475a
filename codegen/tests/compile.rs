//! End-to-end compilation tests: IR in, machine code out.

use anvil_codegen::cursor::FuncCursor;
use anvil_codegen::ir::condcodes::IntCC;
use anvil_codegen::ir::types::{I32, I32X4, I64};
use anvil_codegen::ir::{
    AbiParam, ArgumentPurpose, ExtFuncData, ExternalName, Function, InstBuilder, Signature,
    StackSlotData, StackSlotKind,
};
use anvil_codegen::isa::{self, CallConv, OwnedTargetIsa};
use anvil_codegen::settings;
use anvil_codegen::Context;
use std::str::FromStr;
use target_lexicon::Triple;

fn aarch64() -> OwnedTargetIsa {
    isa::lookup(Triple::from_str("aarch64-unknown-linux-gnu").unwrap())
        .unwrap()
        .finish(settings::Flags::default())
}

fn words(code: &[u8]) -> Vec<u32> {
    code.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `fn(a: i64, b: i64) -> i64 { a + b }` must compile to exactly
/// `add x0, x0, x1; ret`.
#[test]
fn aarch64_add_function() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I64));
    sig.params.push(AbiParam::new(I64));
    sig.returns.push(AbiParam::new(I64));

    let mut func = Function::with_name_signature(ExternalName::user(0, 0), sig);
    let block0 = func.dfg.make_block();
    func.layout.append_block(block0);
    let a = func.dfg.append_block_param(block0, I64);
    let b = func.dfg.append_block_param(block0, I64);
    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let sum = pos.ins().iadd(a, b);
        pos.ins().return_(&[sum]);
    }

    let isa = aarch64();
    let mut ctx = Context::for_function(func);
    let code = ctx.compile(&*isa).expect("compilation succeeds");

    let w = words(&code.code);
    assert_eq!(w[0], 0x8b010000, "add x0, x0, x1");
    assert_eq!(w[1], 0xd65f03c0, "ret");
    assert_eq!(code.frame_size, 0);
    assert!(code.relocs.is_empty());
}

/// A two-block branchy function: `fn(n: i32) -> i32 { if n <= 1 { n }
/// else { n - 1 } }` verifies and compiles.
#[test]
fn aarch64_branchy_function() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I32));
    sig.returns.push(AbiParam::new(I32));

    let mut func = Function::with_name_signature(ExternalName::user(0, 1), sig);
    let block0 = func.dfg.make_block();
    let block_base = func.dfg.make_block();
    let block_rec = func.dfg.make_block();
    func.layout.append_block(block0);
    func.layout.append_block(block_base);
    func.layout.append_block(block_rec);
    let n = func.dfg.append_block_param(block0, I32);
    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let one = pos.ins().iconst(I32, 1);
        let cmp = pos.ins().icmp(IntCC::SignedLessThanOrEqual, n, one);
        pos.ins().brif(cmp, block_base, &[], block_rec, &[]);

        pos.goto_bottom(block_base);
        pos.ins().return_(&[n]);

        pos.goto_bottom(block_rec);
        let one2 = pos.ins().iconst(I32, 1);
        let n1 = pos.ins().isub(n, one2);
        pos.ins().return_(&[n1]);
    }

    let isa = aarch64();
    let mut ctx = Context::for_function(func);
    let code = ctx.compile(&*isa).expect("compilation succeeds");

    let w = words(&code.code);
    // Both blocks end in RET.
    assert_eq!(w.iter().filter(|&&x| x == 0xd65f03c0).count(), 2);
    // There is a conditional branch.
    assert!(w.iter().any(|&x| x & 0xff00_0010 == 0x5400_0000));
}

/// `udiv x, 8` must become a logical shift right, with no division
/// instruction in the output.
#[test]
fn udiv_pow2_has_no_div_instruction() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I64));
    sig.returns.push(AbiParam::new(I64));

    let mut func = Function::with_name_signature(ExternalName::user(0, 2), sig);
    let block0 = func.dfg.make_block();
    func.layout.append_block(block0);
    let x = func.dfg.append_block_param(block0, I64);
    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let eight = pos.ins().iconst(I64, 8);
        let q = pos.ins().udiv(x, eight);
        pos.ins().return_(&[q]);
    }

    let isa = aarch64();
    let mut ctx = Context::for_function(func);
    let code = ctx.compile(&*isa).expect("compilation succeeds");

    let w = words(&code.code);
    // No UDIV (data-processing 2-source, opcode 000010).
    assert!(
        !w.iter().any(|&x| x & 0xffe0_fc00 == 0x9ac0_0800),
        "udiv instruction found in {:08x?}",
        w
    );
    // A 64-bit LSR-by-immediate (UBFM) with imms == 63 is present.
    assert!(
        w.iter().any(|&x| x & 0xffc0_fc00 == 0xd340_fc00),
        "lsr #3 not found in {:08x?}",
        w
    );
}

/// A SIMD v4i32 add compiles to the three-same integer add family.
#[test]
fn aarch64_vector_add() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I32X4));
    sig.params.push(AbiParam::new(I32X4));
    sig.returns.push(AbiParam::new(I32X4));

    let mut func = Function::with_name_signature(ExternalName::user(0, 3), sig);
    let block0 = func.dfg.make_block();
    func.layout.append_block(block0);
    let a = func.dfg.append_block_param(block0, I32X4);
    let b = func.dfg.append_block_param(block0, I32X4);
    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let sum = pos.ins().iadd(a, b);
        pos.ins().return_(&[sum]);
    }

    let isa = aarch64();
    let mut ctx = Context::for_function(func);
    let code = ctx.compile(&*isa).expect("compilation succeeds");

    let w = words(&code.code);
    // ADD Vd.4S: 0Q001110 size=10 1 Rm 100001 Rn Rd with U=0, Q=1.
    assert!(
        w.iter().any(|&x| x & 0xffe0_fc00 == 0x4ea0_8400),
        "vector add not found in {:08x?}",
        w
    );
}

/// A large-aggregate return goes through an sret pointer in x8: the call
/// site reserves stack space and moves the pointer into x8 before BL.
#[test]
fn aarch64_sret_call() {
    // The callee: fn(sret ptr) -> ().
    let mut callee_sig = Signature::new(CallConv::SystemV);
    callee_sig
        .params
        .push(AbiParam::special(I64, ArgumentPurpose::StructReturn));

    let mut sig = Signature::new(CallConv::SystemV);
    sig.returns.push(AbiParam::new(I64));

    let mut func = Function::with_name_signature(ExternalName::user(0, 4), sig);
    let sigref = func.import_signature(callee_sig);
    let fnref = func.import_function(ExtFuncData {
        name: ExternalName::user(7, 7),
        signature: sigref,
        colocated: false,
    });
    let ss = func.create_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, 24, 3));
    let block0 = func.dfg.make_block();
    func.layout.append_block(block0);
    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let addr = pos.ins().stack_addr(I64, ss, 0);
        pos.ins().call(fnref, &[addr]);
        let first = pos.ins().stack_load(I64, ss, 0);
        pos.ins().return_(&[first]);
    }

    let isa = aarch64();
    let mut ctx = Context::for_function(func);
    let code = ctx.compile(&*isa).expect("compilation succeeds");

    // The frame must hold the 24-byte slot.
    assert!(code.frame_size >= 24, "frame size {}", code.frame_size);
    // Some move targets x8 (orr x8, xzr, xN).
    let w = words(&code.code);
    assert!(
        w.iter().any(|&x| x & 0xffe0_ffff == 0xaa00_03e8),
        "no move into x8 found in {:08x?}",
        w
    );
    // The call site produced a call relocation.
    assert_eq!(code.relocs.len(), 1);
}

/// Compilation output is byte-identical across repeated runs.
#[test]
fn determinism() {
    let build = || {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(I64));
        sig.returns.push(AbiParam::new(I64));
        let mut func = Function::with_name_signature(ExternalName::user(0, 5), sig);
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let x = func.dfg.append_block_param(block0, I64);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let c = pos.ins().iconst(I64, 1234567);
            let y = pos.ins().imul(x, c);
            let z = pos.ins().iadd(y, c);
            pos.ins().return_(&[z]);
        }
        func
    };

    let isa = aarch64();
    let code1 = Context::for_function(build()).compile(&*isa).unwrap();
    let code2 = Context::for_function(build()).compile(&*isa).unwrap();
    assert_eq!(code1.code, code2.code);
    assert_eq!(code1.frame_size, code2.frame_size);
}

/// A conditional branch whose target lies beyond the 1 MiB conditional-
/// branch range gets a veneer; all fixups resolve and the code stays
/// well-formed.
#[test]
fn aarch64_far_branch_veneer() {
    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I64));
    sig.returns.push(AbiParam::new(I64));

    let mut func = Function::with_name_signature(ExternalName::user(0, 6), sig);
    let entry = func.dfg.make_block();
    func.layout.append_block(entry);
    let x = func.dfg.append_block_param(entry, I64);

    // A chain of filler blocks, each with enough adds to put the far
    // target out of the 19-bit range of the entry's conditional branch.
    // Each block threads its running value through a block parameter so
    // the filler code is genuinely live.
    const BLOCKS: usize = 300;
    const PER_BLOCK: usize = 1000;
    let mut blocks = Vec::with_capacity(BLOCKS);
    for _ in 0..BLOCKS {
        let b = func.dfg.make_block();
        func.layout.append_block(b);
        func.dfg.append_block_param(b, I64);
        blocks.push(b);
    }
    let far = func.dfg.make_block();
    func.layout.append_block(far);

    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(entry);
        pos.ins().brif(x, far, &[], blocks[0], &[x]);
        for (i, &b) in blocks.iter().enumerate() {
            let mut v = pos.func.dfg.block_params(b)[0];
            pos.goto_bottom(b);
            for _ in 0..PER_BLOCK {
                v = pos.ins().iadd(v, v);
            }
            if i + 1 < BLOCKS {
                pos.ins().jump(blocks[i + 1], &[v]);
            } else {
                pos.ins().return_(&[v]);
            }
        }
        pos.goto_bottom(far);
        let zero = pos.ins().iconst(I64, 0);
        pos.ins().return_(&[zero]);
    }

    let isa = aarch64();
    let mut ctx = Context::for_function(func);
    let code = ctx.compile(&*isa).expect("compilation succeeds");
    // The function is larger than the conditional branch's direct range.
    assert!(code.code.len() > (1 << 20), "code size {}", code.code.len());
}

/// The integer core compiles on the other targets too.
#[test]
fn other_targets_add_function() {
    for (triple, check_ret) in [
        ("x86_64-unknown-linux-gnu", Some(0xc3u8)),
        ("riscv64gc-unknown-linux-gnu", None),
        ("s390x-unknown-linux-gnu", None),
    ] {
        let isa = isa::lookup(Triple::from_str(triple).unwrap())
            .unwrap()
            .finish(settings::Flags::default());

        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(I64));
        sig.params.push(AbiParam::new(I64));
        sig.returns.push(AbiParam::new(I64));
        let mut func = Function::with_name_signature(ExternalName::user(0, 9), sig);
        let block0 = func.dfg.make_block();
        func.layout.append_block(block0);
        let a = func.dfg.append_block_param(block0, I64);
        let b = func.dfg.append_block_param(block0, I64);
        {
            let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
            let sum = pos.ins().iadd(a, b);
            pos.ins().return_(&[sum]);
        }

        let mut ctx = Context::for_function(func);
        let code = ctx
            .compile(&*isa)
            .unwrap_or_else(|e| panic!("{}: {}", triple, e));
        assert!(!code.code.is_empty());
        if let Some(ret) = check_ret {
            assert_eq!(*code.code.last().unwrap(), ret, "{}", triple);
        }
    }
}

/// Legalization is idempotent and optimization passes converge: running
/// the mid-end twice produces the same function.
#[test]
fn optimize_idempotent() {
    let isa = {
        let mut b = settings::Builder::new();
        b.set_opt_level(settings::OptLevel::Speed);
        isa::lookup(Triple::from_str("aarch64-unknown-linux-gnu").unwrap())
            .unwrap()
            .finish(b.finish())
    };

    let mut sig = Signature::new(CallConv::SystemV);
    sig.params.push(AbiParam::new(I64));
    sig.returns.push(AbiParam::new(I64));
    let mut func = Function::with_name_signature(ExternalName::user(0, 10), sig);
    let block0 = func.dfg.make_block();
    func.layout.append_block(block0);
    let x = func.dfg.append_block_param(block0, I64);
    {
        let mut pos = FuncCursor::new(&mut func).at_bottom(block0);
        let a = pos.ins().iconst(I64, 21);
        let b = pos.ins().iconst(I64, 2);
        let c = pos.ins().imul(a, b);
        let d = pos.ins().iadd(x, c);
        let e = pos.ins().iadd(x, c);
        let f = pos.ins().iadd(d, e);
        pos.ins().return_(&[f]);
    }

    let mut ctx = Context::for_function(func);
    ctx.optimize(&*isa);
    let first = ctx.func.to_string();
    ctx.optimize(&*isa);
    let second = ctx.func.to_string();
    assert_eq!(first, second);

    let code = ctx.compile(&*isa).expect("compilation succeeds");
    assert!(!code.code.is_empty());
}
