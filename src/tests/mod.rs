#[cfg(test)]
mod support;

#[cfg(test)]
mod tests_protocol;
#[cfg(test)]
mod tests_transports;
