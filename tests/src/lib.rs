//! End-to-end checks that drive plugins through the registry, the way the
//! command line does, with fakes only at the network and process seams.

#[cfg(test)]
mod dispatch;
#[cfg(test)]
mod fanout;
#[cfg(test)]
mod seams;
