use state_machines::state_machine;

state_machine! {
    name: VariantMachine,
    state: VariantState,
    initial: Ready,
    states: [Ready, Converted, Chunked, Persisted, Failed],
    events {
        convert { transition: { from: Ready, to: Converted } }
        chunk { transition: { from: Converted, to: Chunked } }
        persist { transition: { from: Chunked, to: Persisted } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Converted, to: Failed }
            transition: { from: Chunked, to: Failed }
            transition: { from: Persisted, to: Failed }
        }
    }
}

pub fn ready() -> VariantMachine<(), Ready> {
    VariantMachine::new(())
}
