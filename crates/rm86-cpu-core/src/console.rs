/// Character console consumed by the interrupt dispatcher.
///
/// `read_char` blocks until a byte is available, suspending the whole
/// emulated machine (there is exactly one thread of control). The trait is
/// infallible: implementations decide what byte to produce at end of input.
pub trait Console {
    fn read_char(&mut self, echo: bool) -> u8;
    fn write_char(&mut self, byte: u8);
}
