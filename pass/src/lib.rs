/// A transformation over some intermediate representation.
///
/// A pass takes its input by value and returns the (possibly rewritten)
/// representation, so that passes can be composed into pipelines with
/// [`Pass::chain`] without the caller having to thread mutable borrows
/// through every stage.
pub trait Pass {
    type Input<'a>;
    type Output<'a>;
    type Error;

    /// Runs the pass on the given input.
    fn run<'a>(&mut self, input: Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error>;

    /// Chains `next` after `self`, feeding this pass's output into `next`.
    fn chain<P>(self, next: P) -> Chain<Self, P>
    where
        Self: Sized,
        P: for<'a> Pass<Input<'a> = Self::Output<'a>, Error = Self::Error>,
    {
        Chain::new(self, next)
    }
}

/// Two passes composed in sequence, itself a [`Pass`].
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chain<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> Pass for Chain<A, B>
where
    A: Pass,
    B: for<'a> Pass<Input<'a> = A::Output<'a>, Error = A::Error>,
{
    type Input<'a> = A::Input<'a>;
    type Output<'a> = <B as Pass>::Output<'a>;
    type Error = <A as Pass>::Error;

    fn run<'a>(&mut self, input: Self::Input<'a>) -> Result<Self::Output<'a>, Self::Error> {
        let output = self.first.run(input)?;
        self.second.run(output)
    }
}
